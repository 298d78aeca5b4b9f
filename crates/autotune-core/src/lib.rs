//! Autotune Core Library
//!
//! Execution strategy and sandboxed validation engine for a code-optimization
//! agent: establish a passing baseline for a repository, then apply, re-run
//! and judge candidate patches one at a time, always reverting them.

pub mod acceptance;
pub mod bench;
pub mod classifier;
pub mod config;
pub mod constraints;
pub mod domain;
pub mod obs;
pub mod patch;
pub mod report;
pub mod run;
pub mod sandbox;
pub mod strategy;
pub mod telemetry;
pub mod validator;

pub use domain::{
    AcceptanceVerdict, AutotuneError, BaselineResult, BenchResult, BenchmarkComparison,
    BenchmarkDirection, Candidate, CandidateRejection, CandidateResult, Confidence, ConstraintId,
    ConstraintViolation, DetectionResult, ExecutionAttemptPlan, FailureReasonCode, Language,
    Opportunity, PatchResult, PipelineError, PipelineStep, Result, RiskLevel, StepFailure,
    StepResult, StrategyMode, StrategySettings,
};

pub use acceptance::{evaluate_acceptance, AcceptancePolicy};
pub use bench::extract_bench;
pub use classifier::{classify, classify_with_excerpt};
pub use config::{EngineConfig, StepTimeouts};
pub use constraints::{enforce_constraints, ConstraintPolicy};
pub use patch::{
    count_diff_lines, touched_files, PatchApplicator, PatchApplyError, PatchTool, PatchToolConfig,
};
pub use report::{read_run_report, write_run_report};
pub use run::{CandidateEvaluation, OptimizationRun, RunReport};
pub use sandbox::{run_step, PipelineExecutor, ResourceLimits, SandboxExecutor};
pub use strategy::{
    AdapterRegistry, EcosystemAdapter, ExecutionStrategyEngine, StopReason, StrategyOutcome,
};
pub use telemetry::init_tracing;
pub use validator::{with_patch_applied, CandidateValidator};
