/// Result Demultiplexer - one driver invocation in, N ordered outcomes out
///
/// **Guarantee:**
/// The returned vector always has exactly `request_len` elements, in
/// request order, whatever the driver printed. A batch-level failure gives
/// every case the same error and exit code; a case-level failure only
/// affects its own index.

use crate::adapters::LanguageAdapter;
use crate::runtime::ProcessOutput;
use benchbox_common::types::{CaseOutcome, CaseStatus};
use tracing::{debug, warn};

pub fn demultiplex(
    adapter: &dyn LanguageAdapter,
    output: &ProcessOutput,
    request_len: usize,
) -> Vec<CaseOutcome> {
    let markers = adapter.markers();
    let stderr = output.stderr.trim();

    if output.timed_out {
        warn!(cases = request_len, "Batch timed out");
        return batch_failure(CaseStatus::TimedOut, stderr, output.exit_code, request_len);
    }

    if output.exit_code != 0 && stderr.contains(markers.fatal_error) {
        let fatal: Vec<&str> = stderr
            .lines()
            .filter(|line| line.contains(markers.fatal_error))
            .collect();
        warn!(exit_code = output.exit_code, "Driver reported a fatal error");
        return batch_failure(
            CaseStatus::DriverFailed,
            &fatal.join("\n"),
            output.exit_code,
            request_len,
        );
    }

    let Some(end) = output.stdout.find(markers.end_of_batch) else {
        let mut error = format!(
            "Driver output ended without {} (exit code {})",
            markers.end_of_batch, output.exit_code
        );
        if !stderr.is_empty() {
            error.push('\n');
            error.push_str(stderr);
        }
        warn!(exit_code = output.exit_code, "End-of-batch marker missing");
        return batch_failure(
            CaseStatus::MalformedOutput,
            &error,
            nonzero(output.exit_code),
            request_len,
        );
    };

    let mut chunks: Vec<&str> = output.stdout[..end].split(markers.separator).collect();
    while chunks.last().is_some_and(|c| c.trim().is_empty()) {
        chunks.pop();
    }

    if chunks.len() > request_len {
        warn!(
            chunks = chunks.len(),
            expected = request_len,
            "Driver produced more chunks than requested, truncating"
        );
        chunks.truncate(request_len);
    }

    let mut outcomes: Vec<CaseOutcome> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| adapter.decode_chunk(chunk, &output.stderr, i))
        .collect();

    debug!(decoded = outcomes.len(), expected = request_len, "Decoded driver output");

    let missing_error = if output.exit_code != 0 {
        let mut error = format!("Not run: driver exited with code {}", output.exit_code);
        if !stderr.is_empty() {
            error.push('\n');
            error.push_str(stderr);
        }
        error
    } else {
        "Not run: driver produced no output for this case".to_string()
    };
    while outcomes.len() < request_len {
        outcomes.push(CaseOutcome::failure(
            CaseStatus::NotRun,
            missing_error.clone(),
            nonzero(output.exit_code),
        ));
    }

    outcomes
}

fn batch_failure(status: CaseStatus, error: &str, exit_code: i64, n: usize) -> Vec<CaseOutcome> {
    (0..n)
        .map(|_| CaseOutcome::failure(status, error, exit_code))
        .collect()
}

/// Failed cases never report exit code 0
fn nonzero(exit_code: i64) -> i64 {
    if exit_code == 0 {
        1
    } else {
        exit_code
    }
}
