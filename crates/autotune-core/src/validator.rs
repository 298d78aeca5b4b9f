//! Candidate validation: gate, apply, re-run, always revert.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::constraints::{enforce_constraints, ConstraintPolicy};
use crate::domain::{
    BaselineResult, Candidate, CandidateRejection, CandidateResult, PipelineStep,
};
use crate::obs;
use crate::patch::{PatchApplicator, PatchApplyError, PatchResultOf};
use crate::sandbox::PipelineExecutor;
use crate::strategy::StrategyOutcome;

/// Output of a body run under [`with_patch_applied`].
#[derive(Debug)]
pub struct Applied<T> {
    pub value: T,
    /// Outcome of the revert that followed the body.
    pub revert: PatchResultOf<()>,
}

/// Apply `diff`, run `body`, then revert `diff`.
///
/// The revert runs on every path out of `body`, including a panic, which is
/// resumed once the revert has been attempted. If the apply itself fails the
/// body never runs and the error is returned.
pub async fn with_patch_applied<T, Fut>(
    applicator: &dyn PatchApplicator,
    repo_dir: &Path,
    diff: &str,
    body: Fut,
) -> PatchResultOf<Applied<T>>
where
    Fut: Future<Output = T>,
{
    applicator.apply_diff(repo_dir, diff).await?;

    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let revert = applicator.revert_diff(repo_dir, diff).await;

    match outcome {
        Ok(value) => Ok(Applied { value, revert }),
        Err(panic) => {
            if let Err(e) = &revert {
                error!(event = "patch.revert_failed", error = %e, "revert after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

/// Validates candidate patches against an established baseline.
///
/// Borrows the working tree for the whole apply -> steps -> revert sequence,
/// so candidates sharing a tree must be validated one at a time.
pub struct CandidateValidator {
    executor: Arc<dyn PipelineExecutor>,
    applicator: Arc<dyn PatchApplicator>,
    policy: ConstraintPolicy,
}

impl CandidateValidator {
    pub fn new(
        executor: Arc<dyn PipelineExecutor>,
        applicator: Arc<dyn PatchApplicator>,
        policy: ConstraintPolicy,
    ) -> Self {
        Self {
            executor,
            applicator,
            policy,
        }
    }

    pub async fn validate_candidate(
        &self,
        repo_dir: &Path,
        candidate: &Candidate,
        baseline: &StrategyOutcome,
        cancel: &CancellationToken,
    ) -> CandidateResult {
        let id = candidate.id();

        if let Err(violation) = enforce_constraints(&candidate.patch, &self.policy) {
            obs::emit_candidate_rejected(id, &violation);
            return CandidateResult::rejected(id, CandidateRejection::Constraint { violation });
        }

        let Some(plan) = baseline.final_plan() else {
            return CandidateResult::from_run(
                id,
                BaselineResult::interrupted(Vec::new(), "baseline has no executed plan"),
            );
        };

        let run = self
            .executor
            .run_steps(repo_dir, plan, &PipelineStep::CANDIDATE, cancel);
        let applied =
            with_patch_applied(self.applicator.as_ref(), repo_dir, &candidate.patch.diff, run).await;

        match applied {
            Err(e) => {
                let rejection = patch_rejection(&e);
                obs::emit_candidate_rejected(id, &rejection);
                CandidateResult::rejected(id, rejection)
            }
            Ok(Applied { value, revert }) => {
                let mut result = CandidateResult::from_run(id, value);
                if let Err(e) = revert {
                    obs::emit_revert_failed(id, &e);
                    let note = format!("revert failed: {e}");
                    result.error = Some(match result.error.take() {
                        Some(err) => format!("{err}; {note}"),
                        None => note,
                    });
                    result.tree_clean = false;
                }
                debug!(candidate_id = %id, success = result.is_success, "candidate run finished");
                result
            }
        }
    }
}

fn patch_rejection(error: &PatchApplyError) -> CandidateRejection {
    let (stdout, stderr) = error.tool_output();
    CandidateRejection::PatchApply {
        message: error.to_string(),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::patch::PatchOperation;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<&'static str>>,
        fail_revert: bool,
    }

    #[async_trait]
    impl PatchApplicator for Recording {
        async fn apply_diff(&self, _repo_dir: &Path, _diff: &str) -> PatchResultOf<()> {
            self.calls.lock().unwrap().push("apply");
            Ok(())
        }

        async fn revert_diff(&self, _repo_dir: &Path, _diff: &str) -> PatchResultOf<()> {
            self.calls.lock().unwrap().push("revert");
            if self.fail_revert {
                return Err(PatchApplyError::Failed {
                    operation: PatchOperation::Revert,
                    dry_run: true,
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "hunk FAILED".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_revert_runs_after_body() {
        let applicator = Recording::default();
        let applied = with_patch_applied(&applicator, Path::new("."), "diff", async { 7 })
            .await
            .unwrap();
        assert_eq!(applied.value, 7);
        assert!(applied.revert.is_ok());
        assert_eq!(*applicator.calls.lock().unwrap(), vec!["apply", "revert"]);
    }

    #[tokio::test]
    async fn test_revert_runs_when_body_panics() {
        let applicator = Recording::default();
        let result = AssertUnwindSafe(with_patch_applied(
            &applicator,
            Path::new("."),
            "diff",
            async { panic!("step blew up") },
        ))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert_eq!(*applicator.calls.lock().unwrap(), vec!["apply", "revert"]);
    }

    #[tokio::test]
    async fn test_revert_failure_is_reported() {
        let applicator = Recording {
            fail_revert: true,
            ..Recording::default()
        };
        let applied = with_patch_applied(&applicator, Path::new("."), "diff", async {})
            .await
            .unwrap();
        assert!(matches!(
            applied.revert,
            Err(PatchApplyError::Failed {
                operation: PatchOperation::Revert,
                ..
            })
        ));
    }
}
