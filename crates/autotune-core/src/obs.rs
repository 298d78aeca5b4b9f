//! Structured observability hooks for optimization runs.
//!
//! - Run-scoped tracing span via the `RunSpan` RAII guard
//! - Emitters for attempt, candidate, patch and sandbox lifecycle events
//!
//! Events are plain `tracing` records with an `event` field, so they can be
//! filtered with `RUST_LOG` and rendered as JSON by [`crate::telemetry`].

use tracing::{debug, error, info, warn};

use crate::domain::{AcceptanceVerdict, ExecutionAttemptPlan, StepFailure, StepResult};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // every event below carries run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// The `autotune.run` span, for instrumenting async work that may move
/// between threads (an entered [`RunSpan`] must not be held across `.await`).
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("autotune.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, language: &str, candidates: usize) {
    info!(event = "run.started", run_id = %run_id, language = %language, candidates);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, accepted: usize, cancelled: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms,
        accepted,
        cancelled,
    );
}

pub fn emit_attempt_started(plan: &ExecutionAttemptPlan) {
    let reason = plan
        .metadata
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("initial");
    info!(
        event = "attempt.started",
        attempt = plan.attempt,
        mode = %plan.mode,
        reason = %reason,
    );
}

pub fn emit_attempt_finished(attempt: u32, success: bool, duration_ms: u64, failure: Option<&StepFailure>) {
    match failure {
        Some(f) => info!(
            event = "attempt.finished",
            attempt,
            success,
            duration_ms,
            failed_step = %f.step,
            reason = %f.reason,
        ),
        None => info!(event = "attempt.finished", attempt, success, duration_ms),
    }
}

pub fn emit_step_finished(attempt: u32, step: &StepResult) {
    debug!(
        event = "step.finished",
        attempt,
        step = %step.step,
        exit_code = step.exit_code,
        duration_ms = step.duration_ms,
        timed_out = step.timed_out,
    );
}

pub fn emit_candidate_rejected(candidate_id: &str, reason: &dyn std::fmt::Display) {
    info!(event = "candidate.rejected", candidate_id = %candidate_id, reason = %reason);
}

pub fn emit_candidate_evaluated(candidate_id: &str, verdict: &AcceptanceVerdict) {
    info!(
        event = "candidate.evaluated",
        candidate_id = %candidate_id,
        accepted = verdict.accepted,
        confidence = ?verdict.confidence,
        risk_score = verdict.risk_score,
    );
}

/// A failed revert leaves the working tree dirty.
pub fn emit_revert_failed(candidate_id: &str, error: &dyn std::fmt::Display) {
    error!(event = "patch.revert_failed", candidate_id = %candidate_id, error = %error);
}

pub fn emit_limits_degraded(detail: &str) {
    warn!(event = "limits.degraded", detail = %detail);
}
