//! Execution strategy: how a baseline is established.
//!
//! # Modules
//!
//! - [`adapter`]: `EcosystemAdapter`, per-ecosystem remediations
//! - [`registry`]: `AdapterRegistry`, language to adapter mapping
//! - [`engine`]: `ExecutionStrategyEngine`, `StrategyOutcome`, `StopReason`
//! - [`rewrite`]: token-level command line rewrites used by adapters

pub mod adapter;
pub mod engine;
pub mod registry;
pub mod rewrite;

pub use adapter::EcosystemAdapter;
pub use engine::{ExecutionStrategyEngine, StopReason, StrategyOutcome};
pub use registry::AdapterRegistry;
