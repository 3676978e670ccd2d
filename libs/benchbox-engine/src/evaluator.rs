/// Result Evaluator - correctness and profile statistics
///
/// **Core Responsibility:**
/// Compare case outcomes against expected values and aggregate metrics.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about language runtimes
/// - Pure functions: (outcomes, expectations) → verdicts
///
/// **Comparison Rules:**
/// - A case with an error never passes
/// - Strings that look like JSON arrays/objects are parsed first
/// - Equal-length lists whose elements share one JSON type compare as
///   multisets (order-insensitive, duplicates counted)
/// - Numbers compare by value, so `1` equals `1.0`
/// - Everything else must match exactly

use benchbox_common::types::{CaseOutcome, ProfileStats, TestCase, TestReport, TestResult};
use serde_json::Value;
use std::borrow::Cow;

/// Whether `actual` satisfies `expected`
pub fn compare_results(actual: &Value, expected: &Value) -> bool {
    let actual = parse_embedded_json(actual);
    let expected = parse_embedded_json(expected);

    match (actual.as_ref(), expected.as_ref()) {
        (Value::Array(a), Value::Array(e))
            if a.len() == e.len() && is_homogeneous(a) && is_homogeneous(e) =>
        {
            same_multiset(a, e)
        }
        (a, e) => values_equal(a, e),
    }
}

/// Parse strings like `"[0, 1]"` so they compare as the value they spell
fn parse_embedded_json(value: &Value) -> Cow<'_, Value> {
    if let Value::String(s) = value {
        let trimmed = s.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                return Cow::Owned(parsed);
            }
        }
    }
    Cow::Borrowed(value)
}

fn kind(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn is_homogeneous(items: &[Value]) -> bool {
    items.windows(2).all(|w| kind(&w[0]) == kind(&w[1]))
}

fn same_multiset(actual: &[Value], expected: &[Value]) -> bool {
    let mut unmatched: Vec<&Value> = expected.iter().collect();
    for item in actual {
        match unmatched.iter().position(|e| values_equal(item, e)) {
            Some(i) => {
                unmatched.swap_remove(i);
            }
            None => return false,
        }
    }
    unmatched.is_empty()
}

/// Deep equality where numbers compare by value
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Judge one case outcome against its test case
pub fn evaluate_case(case_num: usize, test_case: &TestCase, outcome: CaseOutcome) -> TestResult {
    let passed = outcome.is_ok() && compare_results(&outcome.result, &test_case.output);
    TestResult {
        case_num,
        passed,
        input: test_case.input.clone(),
        expected: test_case.output.clone(),
        outcome,
    }
}

/// Pair numbered test cases with their outcomes and summarize
///
/// `cases` and `outcomes` are parallel and in request order.
pub fn evaluate(cases: &[(usize, TestCase)], outcomes: Vec<CaseOutcome>, elapsed_ms: u64) -> TestReport {
    let results: Vec<TestResult> = cases
        .iter()
        .zip(outcomes)
        .map(|((case_num, tc), outcome)| evaluate_case(*case_num, tc, outcome))
        .collect();

    let passed = results.iter().filter(|r| r.passed).count();
    TestReport {
        total: results.len(),
        passed,
        results,
        elapsed_ms,
    }
}

/// Mean/min/max of the metrics reported by replicated runs.
///
/// Metrics a driver did not report are skipped; a metric no run reported
/// stays `None`.
pub fn aggregate_profile(outcomes: &[CaseOutcome]) -> ProfileStats {
    let times: Vec<f64> = outcomes.iter().filter_map(|o| o.time_ms).collect();
    let mems: Vec<u64> = outcomes.iter().filter_map(|o| o.mem_bytes).collect();

    ProfileStats {
        iterations: outcomes.len(),
        avg_time_ms: mean(times.iter().copied()),
        min_time_ms: times.iter().copied().reduce(f64::min),
        max_time_ms: times.iter().copied().reduce(f64::max),
        avg_mem_bytes: mean(mems.iter().map(|&m| m as f64)),
        min_mem_bytes: mems.iter().copied().min(),
        max_mem_bytes: mems.iter().copied().max(),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
