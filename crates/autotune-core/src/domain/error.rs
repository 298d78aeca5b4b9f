//! Domain-level error taxonomy for Autotune.

use super::result::StepResult;

/// A failed pipeline step wrapped for propagation.
///
/// Used when a caller needs a single error value meaning "this step failed"
/// instead of inspecting a [`BaselineResult`](super::result::BaselineResult).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("step '{step}' failed with exit code {exit_code}: {command}")]
pub struct PipelineError {
    pub step: String,
    pub command: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl PipelineError {
    pub fn from_step(step: &StepResult) -> Self {
        Self {
            step: step.step.clone(),
            command: step.command.clone(),
            exit_code: step.exit_code,
            timed_out: step.timed_out,
        }
    }
}

/// Autotune domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AutotuneError {
    #[error("patch tool '{tool}' is not available on this host: {reason}")]
    PatchToolMissing { tool: String, reason: String },

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for AutotuneError {
    fn from(err: toml::de::Error) -> Self {
        AutotuneError::Config(err.to_string())
    }
}

/// Result type for Autotune domain operations.
pub type Result<T> = std::result::Result<T, AutotuneError>;
