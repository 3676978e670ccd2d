use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort an operation before any case outcome exists.
///
/// Batch-level conditions that still produce outcomes (build failures,
/// timeouts, malformed driver output) and case-level conditions are
/// reported through `CaseOutcome::status` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build image '{image}' (exit code {exit_code}): {stderr}")]
    ImageBuild {
        image: String,
        exit_code: i64,
        stderr: String,
    },
    #[error("Failed to start sandbox '{sandbox}': {source}")]
    SandboxStart {
        sandbox: String,
        source: anyhow::Error,
    },
    #[error("Unsupported language '{name}'. Supported: {supported}")]
    UnknownLanguage { name: String, supported: String },
    #[error("Unable to prepare workspace file {}: {source}", path.display())]
    Workspace { path: PathBuf, source: io::Error },
    #[error("Unable to encode batch inputs: {source}")]
    EncodeInputs { source: serde_json::Error },
    #[error("Container runtime error: {source}")]
    Runtime { source: anyhow::Error },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
