//! Step, baseline and candidate execution results.

use serde::{Deserialize, Serialize};

use super::candidate::ConstraintViolation;
use super::error::PipelineError;
use super::plan::PipelineStep;

/// Exit code recorded when a step never produced one (timeout, spawn failure).
pub const EXIT_SENTINEL: i32 = -1;

/// Outcome of one executed pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// Step name ("install", "build", ...).
    pub step: String,

    /// Shell command line that was executed.
    pub command: String,

    /// Exit code (0 = success, -1 = timeout or spawn failure).
    pub exit_code: i32,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    pub stdout: String,
    pub stderr: String,

    /// Whether the wall-clock timeout terminated the process.
    #[serde(default)]
    pub timed_out: bool,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn pipeline_step(&self) -> Option<PipelineStep> {
        PipelineStep::from_name(&self.step)
    }

    /// Combined stdout + stderr.
    pub fn combined_output(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Benchmark metric extracted from a bench step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchResult {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Direction of goodness: `true` for latencies, `false` for throughput.
    #[serde(default = "default_lower_is_better")]
    pub lower_is_better: bool,
}

fn default_lower_is_better() -> bool {
    true
}

/// Result of one pipeline attempt.
///
/// Fail-fast: `steps` ends at the first failing step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BaselineResult {
    pub steps: Vec<StepResult>,
    pub is_success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub bench_result: Option<BenchResult>,
}

impl BaselineResult {
    /// Build a result from executed steps, deriving `is_success` and `error`.
    pub fn from_steps(steps: Vec<StepResult>, bench_result: Option<BenchResult>) -> Self {
        let failed = steps.iter().find(|s| !s.is_success());
        let error = failed.map(|s| {
            if s.timed_out {
                format!("step '{}' timed out", s.step)
            } else {
                format!("step '{}' exited with code {}", s.step, s.exit_code)
            }
        });
        Self {
            is_success: failed.is_none(),
            steps,
            error,
            bench_result,
        }
    }

    /// An attempt that stopped before completing for a non-step reason.
    pub fn interrupted(steps: Vec<StepResult>, error: impl Into<String>) -> Self {
        Self {
            steps,
            is_success: false,
            error: Some(error.into()),
            bench_result: None,
        }
    }

    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.is_success())
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step.name())
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }

    /// Convert a failed attempt into a [`PipelineError`] for propagation.
    pub fn ensure_success(&self) -> Result<(), PipelineError> {
        match self.first_failure() {
            Some(step) => Err(PipelineError::from_step(step)),
            None => Ok(()),
        }
    }
}

/// Why candidate validation was short-circuited before running any step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateRejection {
    /// The static constraint gate refused the patch.
    Constraint { violation: ConstraintViolation },

    /// The patch tool could not apply the diff.
    PatchApply {
        message: String,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
    },
}

impl std::fmt::Display for CandidateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateRejection::Constraint { violation } => write!(f, "{violation}"),
            CandidateRejection::PatchApply { message, .. } => {
                write!(f, "patch did not apply: {message}")
            }
        }
    }
}

/// Post-patch run of (a subset of) the pipeline for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub steps: Vec<StepResult>,
    pub is_success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub bench_result: Option<BenchResult>,
    #[serde(default)]
    pub rejection: Option<CandidateRejection>,
    /// Whether the diff was reverted cleanly (or never applied).
    #[serde(default = "default_tree_clean")]
    pub tree_clean: bool,
}

fn default_tree_clean() -> bool {
    true
}

impl CandidateResult {
    /// A candidate refused before touching the tree.
    pub fn rejected(candidate_id: impl Into<String>, rejection: CandidateRejection) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            steps: Vec::new(),
            is_success: false,
            error: Some(rejection.to_string()),
            bench_result: None,
            rejection: Some(rejection),
            tree_clean: true,
        }
    }

    /// A candidate whose pipeline subset ran to completion or to a failure.
    pub fn from_run(candidate_id: impl Into<String>, run: BaselineResult) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            steps: run.steps,
            is_success: run.is_success,
            error: run.error,
            bench_result: run.bench_result,
            rejection: None,
            tree_clean: true,
        }
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::ConstraintId;

    fn step(name: &str, exit_code: i32) -> StepResult {
        StepResult {
            step: name.to_string(),
            command: format!("run {name}"),
            exit_code,
            duration_ms: 100,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    #[test]
    fn test_step_result_success_is_exit_zero() {
        assert!(step("build", 0).is_success());
        assert!(!step("build", 1).is_success());
        assert!(!step("build", EXIT_SENTINEL).is_success());
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let mut s = step("test", 1);
        s.stdout = "out".to_string();
        s.stderr = "err".to_string();
        assert_eq!(s.combined_output(), "out\nerr");
        s.stdout.clear();
        assert_eq!(s.combined_output(), "err");
    }

    #[test]
    fn test_baseline_from_steps_success() {
        let result = BaselineResult::from_steps(vec![step("install", 0), step("test", 0)], None);
        assert!(result.is_success);
        assert!(result.error.is_none());
        assert_eq!(result.total_duration_ms(), 200);
        assert!(result.ensure_success().is_ok());
    }

    #[test]
    fn test_baseline_from_steps_failure() {
        let result = BaselineResult::from_steps(vec![step("install", 0), step("build", 2)], None);
        assert!(!result.is_success);
        assert_eq!(result.first_failure().map(|s| s.step.as_str()), Some("build"));
        assert!(result.error.as_deref().unwrap().contains("code 2"));
        let err = result.ensure_success().unwrap_err();
        assert_eq!(err.step, "build");
    }

    #[test]
    fn test_baseline_timeout_error_message() {
        let mut s = step("test", EXIT_SENTINEL);
        s.timed_out = true;
        let result = BaselineResult::from_steps(vec![s], None);
        assert_eq!(result.error.as_deref(), Some("step 'test' timed out"));
    }

    #[test]
    fn test_candidate_rejected_carries_reason() {
        let rejection = CandidateRejection::Constraint {
            violation: ConstraintViolation::new(ConstraintId::MaxLines, "202 changed lines > 200"),
        };
        let result = CandidateResult::rejected("opp-1", rejection);
        assert!(!result.is_success);
        assert!(result.steps.is_empty());
        assert!(result.tree_clean);
        assert!(result.error.as_deref().unwrap().contains("max_lines"));
    }

    #[test]
    fn test_candidate_rejection_serde_tagged() {
        let rejection = CandidateRejection::PatchApply {
            message: "hunk FAILED".to_string(),
            stdout: String::new(),
            stderr: "1 out of 1 hunk FAILED".to_string(),
        };
        let json = serde_json::to_value(&rejection).unwrap();
        assert_eq!(json["type"], "patch_apply");
        let back: CandidateRejection = serde_json::from_value(json).unwrap();
        assert_eq!(rejection, back);
    }
}
