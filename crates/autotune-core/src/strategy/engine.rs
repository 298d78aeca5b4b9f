//! Execution strategy engine: establish a baseline in strict or adaptive mode.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::AdapterRegistry;
use crate::classifier::{classify_with_excerpt, DEFAULT_EXCERPT_BYTES};
use crate::domain::{
    BaselineResult, DetectionResult, ExecutionAttemptPlan, StepFailure, StrategyMode,
    StrategySettings,
};
use crate::obs;
use crate::sandbox::PipelineExecutor;

/// Why the engine stopped attempting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The last attempt passed.
    Succeeded,
    /// Strict mode: one attempt, whatever the outcome.
    SingleAttempt,
    /// The adapter had no (new) remediation for the failure.
    NoRemediation,
    /// `max_attempts` reached.
    AttemptsExhausted,
    Cancelled,
}

/// Result of establishing a baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyOutcome {
    /// Result of the last attempt.
    pub baseline: BaselineResult,
    /// Every plan that was executed, in order.
    pub plans: Vec<ExecutionAttemptPlan>,
    /// Classified failure of every failed attempt, in order.
    pub failures: Vec<StepFailure>,
    pub stop_reason: StopReason,
}

impl StrategyOutcome {
    /// The plan that produced `baseline`.
    pub fn final_plan(&self) -> Option<&ExecutionAttemptPlan> {
        self.plans.last()
    }

    pub fn attempts(&self) -> usize {
        self.plans.len()
    }

    pub fn is_success(&self) -> bool {
        self.baseline.is_success
    }
}

/// Drives attempts through a [`PipelineExecutor`], replanning via the
/// adapter registered for the detected language.
pub struct ExecutionStrategyEngine {
    executor: Arc<dyn PipelineExecutor>,
    registry: Arc<AdapterRegistry>,
    excerpt_bytes: usize,
}

impl ExecutionStrategyEngine {
    pub fn new(executor: Arc<dyn PipelineExecutor>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            executor,
            registry,
            excerpt_bytes: DEFAULT_EXCERPT_BYTES,
        }
    }

    pub fn with_excerpt_bytes(mut self, excerpt_bytes: usize) -> Self {
        self.excerpt_bytes = excerpt_bytes;
        self
    }

    /// Run the pipeline until it passes or the strategy gives up.
    ///
    /// Strict mode runs exactly one attempt. Adaptive mode starts from the
    /// same plan and asks the adapter for a revised plan after each
    /// classified failure, up to the settings' attempt budget.
    pub async fn establish_baseline(
        &self,
        repo_dir: &Path,
        detection: &DetectionResult,
        settings: &StrategySettings,
        cancel: &CancellationToken,
    ) -> StrategyOutcome {
        let adapter = self.registry.adapter_for(detection.language);
        let budget = settings.effective_attempts();
        debug!(adapter = adapter.name(), mode = %settings.mode, budget, "establishing baseline");

        let mut plan = adapter.build_strict_plan(detection);
        let mut plans: Vec<ExecutionAttemptPlan> = Vec::new();
        let mut failures: Vec<StepFailure> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                let baseline = BaselineResult::interrupted(
                    Vec::new(),
                    format!("cancelled before attempt {}", plan.attempt),
                );
                return StrategyOutcome {
                    baseline,
                    plans,
                    failures,
                    stop_reason: StopReason::Cancelled,
                };
            }

            obs::emit_attempt_started(&plan);
            let baseline = self.executor.run_baseline(repo_dir, &plan, cancel).await;
            let attempt = plan.attempt;
            plans.push(plan.clone());

            if baseline.is_success {
                obs::emit_attempt_finished(attempt, true, baseline.total_duration_ms(), None);
                return StrategyOutcome {
                    baseline,
                    plans,
                    failures,
                    stop_reason: StopReason::Succeeded,
                };
            }

            let failure = classify_with_excerpt(&baseline, self.excerpt_bytes);
            obs::emit_attempt_finished(attempt, false, baseline.total_duration_ms(), Some(&failure));
            failures.push(failure.clone());

            let stop_reason = if cancel.is_cancelled() {
                Some(StopReason::Cancelled)
            } else if settings.mode == StrategyMode::Strict {
                Some(StopReason::SingleAttempt)
            } else if attempt >= budget {
                Some(StopReason::AttemptsExhausted)
            } else {
                None
            };
            if let Some(stop_reason) = stop_reason {
                return StrategyOutcome {
                    baseline,
                    plans,
                    failures,
                    stop_reason,
                };
            }

            match adapter.build_adaptive_plan(detection, &plan, &failure) {
                Some(next) => plan = next,
                None => {
                    return StrategyOutcome {
                        baseline,
                        plans,
                        failures,
                        stop_reason: StopReason::NoRemediation,
                    };
                }
            }
        }
    }
}
