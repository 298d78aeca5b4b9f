//! Optimization run: baseline first, then every candidate in turn.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::acceptance::evaluate_acceptance;
use crate::config::EngineConfig;
use crate::domain::{
    AcceptanceVerdict, AutotuneError, Candidate, CandidateResult, DetectionResult, Language,
    Result, StrategySettings,
};
use crate::obs;
use crate::patch::{PatchApplicator, PatchApplyError, PatchTool};
use crate::sandbox::{PipelineExecutor, SandboxExecutor};
use crate::strategy::{AdapterRegistry, ExecutionStrategyEngine, StrategyOutcome};
use crate::validator::CandidateValidator;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Validation result and verdict for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateEvaluation {
    pub candidate_id: String,
    pub result: CandidateResult,
    pub verdict: AcceptanceVerdict,
}

/// Everything one optimization run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub language: Language,
    pub settings: StrategySettings,
    pub strategy: StrategyOutcome,
    pub evaluations: Vec<CandidateEvaluation>,
    /// Candidates never validated (cancellation, failed baseline, dirty tree).
    #[serde(default)]
    pub skipped: Vec<String>,
    pub cancelled: bool,
    /// A revert failed; the working tree no longer matches the baseline.
    #[serde(default)]
    pub tree_dirty: bool,
}

impl RunReport {
    pub fn accepted(&self) -> impl Iterator<Item = &CandidateEvaluation> {
        self.evaluations.iter().filter(|e| e.verdict.accepted)
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Orchestrates a full run over one checked-out repository.
///
/// The executor defaults to a [`SandboxExecutor`] built from the config; the
/// patch applicator defaults to the host `patch` tool, probed at the start of
/// every run.
pub struct OptimizationRun {
    config: EngineConfig,
    registry: Arc<AdapterRegistry>,
    executor: Arc<dyn PipelineExecutor>,
    applicator: Option<Arc<dyn PatchApplicator>>,
}

impl OptimizationRun {
    pub fn new(config: EngineConfig, registry: Arc<AdapterRegistry>) -> Self {
        let executor = Arc::new(SandboxExecutor::from_config(&config));
        Self {
            config,
            registry,
            executor,
            applicator: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn PipelineExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Use `applicator` instead of probing the host `patch` tool.
    pub fn with_applicator(mut self, applicator: Arc<dyn PatchApplicator>) -> Self {
        self.applicator = Some(applicator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run baseline establishment, then validate and judge each candidate.
    ///
    /// Fails only when the patch tool is missing; pipeline failures are
    /// reported in the returned [`RunReport`].
    pub async fn execute(
        &self,
        repo_dir: &Path,
        detection: &DetectionResult,
        settings: &StrategySettings,
        candidates: &[Candidate],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.execute_inner(run_id, repo_dir, detection, settings, candidates, cancel)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        run_id: String,
        repo_dir: &Path,
        detection: &DetectionResult,
        settings: &StrategySettings,
        candidates: &[Candidate],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        obs::emit_run_started(&run_id, &detection.language.to_string(), candidates.len());

        let applicator = self.applicator().await?;

        let engine = ExecutionStrategyEngine::new(self.executor.clone(), self.registry.clone())
            .with_excerpt_bytes(self.config.excerpt_bytes);
        let strategy = engine
            .establish_baseline(repo_dir, detection, settings, cancel)
            .await;

        let mut evaluations: Vec<CandidateEvaluation> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut tree_dirty = false;

        if !strategy.is_success() {
            info!(stop_reason = ?strategy.stop_reason, "baseline failed, skipping candidates");
            skipped.extend(candidates.iter().map(|c| c.id().to_string()));
        } else {
            let validator = CandidateValidator::new(
                self.executor.clone(),
                applicator,
                self.config.constraints.clone(),
            );
            for (index, candidate) in candidates.iter().enumerate() {
                if cancel.is_cancelled() || tree_dirty {
                    skipped.extend(candidates[index..].iter().map(|c| c.id().to_string()));
                    break;
                }

                let result = validator
                    .validate_candidate(repo_dir, candidate, &strategy, cancel)
                    .await;
                let verdict = evaluate_acceptance(
                    &strategy.baseline,
                    &result,
                    &candidate.opportunity,
                    &self.config.acceptance,
                );
                obs::emit_candidate_evaluated(candidate.id(), &verdict);

                if !result.tree_clean {
                    warn!(candidate_id = %candidate.id(), "working tree left dirty, stopping validation");
                    tree_dirty = true;
                }
                evaluations.push(CandidateEvaluation {
                    candidate_id: candidate.id().to_string(),
                    result,
                    verdict,
                });
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            language: detection.language,
            settings: *settings,
            strategy,
            evaluations,
            skipped,
            cancelled: cancel.is_cancelled(),
            tree_dirty,
        };
        obs::emit_run_finished(
            &report.run_id,
            clock.elapsed().as_millis() as u64,
            report.accepted().count(),
            report.cancelled,
        );
        Ok(report)
    }

    async fn applicator(&self) -> Result<Arc<dyn PatchApplicator>> {
        if let Some(applicator) = &self.applicator {
            return Ok(applicator.clone());
        }
        let tool = PatchTool::probe(self.config.patch.clone())
            .await
            .map_err(tool_missing)?;
        Ok(Arc::new(tool))
    }
}

fn tool_missing(err: PatchApplyError) -> AutotuneError {
    match err {
        PatchApplyError::ToolMissing { tool, reason } => {
            AutotuneError::PatchToolMissing { tool, reason }
        }
        other => AutotuneError::PatchToolMissing {
            tool: "patch".to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchToolConfig;

    #[tokio::test]
    async fn test_missing_patch_tool_is_fatal() {
        let config = EngineConfig {
            patch: PatchToolConfig {
                binary: "autotune-no-such-patch-binary".to_string(),
                ..PatchToolConfig::default()
            },
            ..EngineConfig::default()
        };
        let run = OptimizationRun::new(config, Arc::new(AdapterRegistry::standard()));
        let dir = tempfile::tempdir().unwrap();
        let err = run
            .execute(
                dir.path(),
                &DetectionResult::default(),
                &StrategySettings::strict(),
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            AutotuneError::PatchToolMissing { tool, .. } => {
                assert_eq!(tool, "autotune-no-such-patch-binary")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
