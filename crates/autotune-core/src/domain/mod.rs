//! Domain models for Autotune.
//!
//! Canonical definitions for the engine's inputs and outputs:
//! - `DetectionResult`: what the stack detector found (input)
//! - `StrategySettings` / `ExecutionAttemptPlan`: how a baseline is attempted
//! - `StepResult` / `BaselineResult` / `CandidateResult`: what ran
//! - `StepFailure`: classified failure of an attempt
//! - `Candidate`: opportunity + patch under validation (input)
//! - `AcceptanceVerdict`: final decision per candidate

pub mod candidate;
pub mod detection;
pub mod error;
pub mod failure;
pub mod plan;
pub mod result;
pub mod verdict;

pub use candidate::{
    Candidate, ConstraintId, ConstraintViolation, Opportunity, PatchResult, RiskLevel,
};
pub use detection::{DetectionResult, Language};
pub use error::{AutotuneError, PipelineError, Result};
pub use failure::{FailureReasonCode, StepFailure};
pub use plan::{
    ExecutionAttemptPlan, PipelineStep, StrategyMode, StrategySettings, MAX_ATTEMPTS_CAP,
};
pub use result::{
    BaselineResult, BenchResult, CandidateRejection, CandidateResult, StepResult, EXIT_SENTINEL,
};
pub use verdict::{AcceptanceVerdict, BenchmarkComparison, BenchmarkDirection, Confidence};
