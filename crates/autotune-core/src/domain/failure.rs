//! Normalized failure reasons for a failed pipeline attempt.

use serde::{Deserialize, Serialize};

/// Normalized reason a pipeline step failed.
///
/// Not an error channel: only used to decide whether and how to replan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReasonCode {
    Oom,
    ConcurrencyOom,
    LockfileDrift,
    MissingDevDependencies,
    WrapperMissing,
    CommandNotFound,
    EngineMismatch,
    InstallFailed,
    BuildFailed,
    TypecheckFailed,
    TestFailed,
    Unknown,
}

impl FailureReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReasonCode::Oom => "oom",
            FailureReasonCode::ConcurrencyOom => "concurrency_oom",
            FailureReasonCode::LockfileDrift => "lockfile_drift",
            FailureReasonCode::MissingDevDependencies => "missing_dev_dependencies",
            FailureReasonCode::WrapperMissing => "wrapper_missing",
            FailureReasonCode::CommandNotFound => "command_not_found",
            FailureReasonCode::EngineMismatch => "engine_mismatch",
            FailureReasonCode::InstallFailed => "install_failed",
            FailureReasonCode::BuildFailed => "build_failed",
            FailureReasonCode::TypecheckFailed => "typecheck_failed",
            FailureReasonCode::TestFailed => "test_failed",
            FailureReasonCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepFailure {
    pub step: String,
    pub reason: FailureReasonCode,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
}

impl StepFailure {
    pub fn unknown() -> Self {
        Self {
            step: "unknown".to_string(),
            reason: FailureReasonCode::Unknown,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_code_serde_matches_as_str() {
        let codes = [
            FailureReasonCode::Oom,
            FailureReasonCode::ConcurrencyOom,
            FailureReasonCode::LockfileDrift,
            FailureReasonCode::MissingDevDependencies,
            FailureReasonCode::WrapperMissing,
            FailureReasonCode::CommandNotFound,
            FailureReasonCode::EngineMismatch,
            FailureReasonCode::InstallFailed,
            FailureReasonCode::BuildFailed,
            FailureReasonCode::TypecheckFailed,
            FailureReasonCode::TestFailed,
            FailureReasonCode::Unknown,
        ];
        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_unknown_failure() {
        let f = StepFailure::unknown();
        assert_eq!(f.step, "unknown");
        assert_eq!(f.reason, FailureReasonCode::Unknown);
    }
}
