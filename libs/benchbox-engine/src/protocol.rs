/// Batch Driver Protocol - the wire format between generated drivers and the engine
///
/// One driver invocation writes a single stdout stream:
///
/// ```text
/// <chunk 0>
/// ---SEPARATOR---
/// <chunk 1>
/// ---SEPARATOR---
/// ---END_OUTPUT---
/// ```
///
/// Each chunk decodes on its own. Its layout is adapter-specific: either
/// one JSON document, or marker-prefixed metric lines plus one JSON result
/// line. A call that raised carries the `"ERROR_RESULT"` sentinel and the
/// message travels on stderr as `FUNCTION_ERROR: case <i>: <message>`.
/// A driver that cannot even load its inputs writes `PROFILE_ERROR:` to
/// stderr, the end marker to stdout and exits nonzero.

use serde_json::Value;
use thiserror::Error;

/// File the driver reads its argument tuples from, relative to the workdir
pub const INPUTS_FILENAME: &str = "inputs.json";

/// Result value drivers emit for a call that raised
pub const ERROR_RESULT: &str = "ERROR_RESULT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub separator: &'static str,
    pub end_of_batch: &'static str,
    pub fatal_error: &'static str,
    pub call_error: &'static str,
    pub time: &'static str,
    pub mem: &'static str,
    pub stdout: &'static str,
}

pub const MARKERS: Markers = Markers {
    separator: "---SEPARATOR---",
    end_of_batch: "---END_OUTPUT---",
    fatal_error: "PROFILE_ERROR:",
    call_error: "FUNCTION_ERROR:",
    time: "PROFILE_TIME_MS:",
    mem: "PROFILE_MEM_BYTES:",
    stdout: "PROFILE_STDOUT:",
};

/// How an adapter lays out the fields of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// `{"result": .., "stdout": .., "time_ms": .., "mem_bytes": .., "error": ..}`
    JsonDocument,
    /// Marker-prefixed metric lines plus exactly one JSON result line
    MarkedLines,
}

/// Fields recovered from one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCase {
    pub result: Value,
    pub stdout: String,
    pub time_ms: Option<f64>,
    pub mem_delta: Option<i64>,
    /// Error text the driver managed to inline, if any
    pub inline_error: Option<String>,
}

impl DecodedCase {
    pub fn call_failed(&self) -> bool {
        self.result.as_str() == Some(ERROR_RESULT)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaseDecodeError {
    #[error("empty case output")]
    Empty,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("case document is missing the result field")]
    MissingResult,
    #[error("case output has no result line")]
    NoResultLine,
    #[error("case output has {0} result lines, expected one")]
    AmbiguousResult(usize),
    #[error("invalid value for {marker} {value:?}")]
    InvalidMetric { marker: &'static str, value: String },
}

pub fn decode_chunk(
    layout: ChunkLayout,
    chunk: &str,
    markers: &Markers,
) -> Result<DecodedCase, CaseDecodeError> {
    match layout {
        ChunkLayout::JsonDocument => decode_json_document(chunk),
        ChunkLayout::MarkedLines => decode_marked_lines(chunk, markers),
    }
}

fn decode_json_document(chunk: &str) -> Result<DecodedCase, CaseDecodeError> {
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return Err(CaseDecodeError::Empty);
    }

    let doc: Value =
        serde_json::from_str(chunk).map_err(|e| CaseDecodeError::InvalidJson(e.to_string()))?;
    let obj = doc.as_object().ok_or(CaseDecodeError::MissingResult)?;
    let result = obj.get("result").cloned().ok_or(CaseDecodeError::MissingResult)?;

    Ok(DecodedCase {
        result,
        stdout: obj
            .get("stdout")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        time_ms: obj.get("time_ms").and_then(Value::as_f64),
        mem_delta: obj.get("mem_bytes").and_then(json_integer),
        inline_error: obj.get("error").and_then(Value::as_str).map(str::to_string),
    })
}

/// Accept integral floats too: some runtimes print every number as a double
fn json_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn decode_marked_lines(chunk: &str, markers: &Markers) -> Result<DecodedCase, CaseDecodeError> {
    let mut time_ms = None;
    let mut mem_delta = None;
    let mut stdout = String::new();
    let mut result_lines = Vec::new();

    for line in chunk.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(raw) = line.strip_prefix(markers.time) {
            let raw = raw.trim();
            time_ms = Some(raw.parse::<f64>().map_err(|_| CaseDecodeError::InvalidMetric {
                marker: markers.time,
                value: raw.to_string(),
            })?);
        } else if let Some(raw) = line.strip_prefix(markers.mem) {
            let raw = raw.trim();
            let parsed = raw
                .parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
                .ok_or_else(|| CaseDecodeError::InvalidMetric {
                    marker: markers.mem,
                    value: raw.to_string(),
                })?;
            mem_delta = Some(parsed);
        } else if let Some(raw) = line.strip_prefix(markers.stdout) {
            // Captured stdout is a JSON string so it can span lines safely
            stdout = serde_json::from_str(raw.trim())
                .map_err(|e| CaseDecodeError::InvalidJson(e.to_string()))?;
        } else {
            result_lines.push(line);
        }
    }

    let result_line = match result_lines.as_slice() {
        [] if time_ms.is_none() && mem_delta.is_none() => return Err(CaseDecodeError::Empty),
        [] => return Err(CaseDecodeError::NoResultLine),
        [line] => *line,
        lines => return Err(CaseDecodeError::AmbiguousResult(lines.len())),
    };

    let result = serde_json::from_str(result_line)
        .map_err(|e| CaseDecodeError::InvalidJson(e.to_string()))?;

    Ok(DecodedCase {
        result,
        stdout,
        time_ms,
        mem_delta,
        inline_error: None,
    })
}

/// Message of the stderr line a driver tagged for `index`, if any
pub fn tagged_call_error<'a>(stderr: &'a str, markers: &Markers, index: usize) -> Option<&'a str> {
    let tag = format!("case {}:", index);
    stderr.lines().find_map(|line| {
        line.trim()
            .strip_prefix(markers.call_error)?
            .trim_start()
            .strip_prefix(tag.as_str())
            .map(str::trim)
    })
}
