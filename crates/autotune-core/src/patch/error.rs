//! Error types for the patch module.

use serde::{Deserialize, Serialize};

/// Which direction a patch invocation was going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    Apply,
    Revert,
}

impl std::fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchOperation::Apply => f.write_str("apply"),
            PatchOperation::Revert => f.write_str("revert"),
        }
    }
}

/// Errors produced while applying or reverting a diff.
#[derive(Debug, thiserror::Error)]
pub enum PatchApplyError {
    #[error("refusing to {operation} an empty diff")]
    EmptyDiff { operation: PatchOperation },

    #[error("patch tool '{tool}' is not available: {reason}")]
    ToolMissing { tool: String, reason: String },

    #[error("patch {operation} failed (exit code {exit_code}, dry run: {dry_run}): {stderr}")]
    Failed {
        operation: PatchOperation,
        dry_run: bool,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("patch {operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: PatchOperation,
        timeout_secs: u64,
    },

    #[error("io error while running patch tool: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchApplyError {
    /// Raw tool output, when the tool ran.
    pub fn tool_output(&self) -> (&str, &str) {
        match self {
            PatchApplyError::Failed { stdout, stderr, .. } => (stdout, stderr),
            _ => ("", ""),
        }
    }
}

/// Result type for patch operations.
pub type PatchResultOf<T> = std::result::Result<T, PatchApplyError>;
