use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Guest languages the engine knows how to drive.
///
/// The set is closed: adding a language means adding a variant here and an
/// adapter module in `benchbox-engine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Go,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Go, Language::JavaScript];

    /// Canonical lowercase name, also used in sandbox names and directories
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Go => "go",
            Language::JavaScript => "javascript",
        }
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Go => &["golang"],
            Language::JavaScript => &["js", "node"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments for one call of the user function.
///
/// Solutions follow a fixed two-parameter convention, so a call is always a
/// pair. Serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArgs(pub Value, pub Value);

/// Classification of a single case outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Ok,
    /// The user function raised for this case
    RuntimeError,
    /// The case chunk could not be decoded
    DecodeError,
    /// The driver died before reaching this case
    NotRun,
    BuildFailed,
    /// The driver reported a fatal setup error before any case ran
    DriverFailed,
    /// The end-of-batch marker never appeared
    MalformedOutput,
    TimedOut,
}

/// Result of one call in a batch, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub status: CaseStatus,
    pub result: Value,
    /// Output the user function printed while it ran
    pub stdout: String,
    pub error: Option<String>,
    pub time_ms: Option<f64>,
    pub mem_bytes: Option<u64>,
    /// Logical exit status of this case, 0 on success
    pub exit_code: i64,
}

impl CaseOutcome {
    pub fn success(result: Value, stdout: String, time_ms: Option<f64>, mem_delta: Option<i64>) -> Self {
        Self {
            status: CaseStatus::Ok,
            result,
            stdout,
            error: None,
            time_ms,
            mem_bytes: mem_delta.map(clamp_mem_delta),
            exit_code: 0,
        }
    }

    pub fn failure(status: CaseStatus, error: impl Into<String>, exit_code: i64) -> Self {
        Self {
            status,
            result: Value::Null,
            stdout: String::new(),
            error: Some(error.into()),
            time_ms: None,
            mem_bytes: None,
            exit_code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Memory deltas can come back negative when the guest runtime collects
/// garbage during the call; report those as zero.
pub fn clamp_mem_delta(delta: i64) -> u64 {
    delta.max(0) as u64
}

/// A test case as stored in a problem's testcases.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: CallArgs,
    pub output: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub case_num: usize,
    pub passed: bool,
    pub input: CallArgs,
    pub expected: Value,
    pub outcome: CaseOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub total: usize,
    pub elapsed_ms: u64,
}

impl TestReport {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// Aggregated metrics over the replicated runs of one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub iterations: usize,
    pub avg_time_ms: Option<f64>,
    pub min_time_ms: Option<f64>,
    pub max_time_ms: Option<f64>,
    pub avg_mem_bytes: Option<f64>,
    pub min_mem_bytes: Option<u64>,
    pub max_mem_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseProfile {
    pub case_num: usize,
    /// Auxiliary stdout of the last replicated run
    pub stdout: String,
    pub error: Option<String>,
    pub stats: Option<ProfileStats>,
}
