use std::collections::BTreeSet;
use tracing::warn;

/// Parse a case selection such as `"1,3,5-7"` into 1-based case numbers.
///
/// `None` or an empty selection selects every case. Malformed parts and
/// numbers outside `1..=total` are skipped with a warning rather than
/// failing the whole selection.
pub fn parse_case_selection(selection: Option<&str>, total: usize) -> BTreeSet<usize> {
    let selection = match selection.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return (1..=total).collect(),
    };

    let mut selected = BTreeSet::new();
    let mut out_of_range = false;
    for part in selection.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match parse_part(part) {
            Some((start, end)) => {
                // Clamp before expanding so a huge upper bound costs nothing
                out_of_range |= end > total;
                if start <= total {
                    selected.extend(start..=end.min(total));
                }
            }
            None => warn!(part, "Invalid case selection, skipping"),
        }
    }

    if out_of_range {
        warn!(total, "Some selected cases are outside the valid range");
    }
    selected
}

fn parse_part(part: &str) -> Option<(usize, usize)> {
    let (start, end) = match part.split_once('-') {
        Some((a, b)) => (a.trim().parse().ok()?, b.trim().parse().ok()?),
        None => {
            let n = part.parse().ok()?;
            (n, n)
        }
    };
    (start > 0 && start <= end).then_some((start, end))
}
