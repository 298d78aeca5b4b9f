//! Sandbox: bounded, isolated execution of pipeline steps.
//!
//! Every step runs as its own host subprocess in its own process group, under
//! a wall-clock timeout and best-effort OS resource ceilings.
//!
//! # Modules
//!
//! - [`limits`]: `ResourceLimits` (CPU time, address space)
//! - [`executor`]: `run_step()`, `PipelineExecutor`, `SandboxExecutor`

pub mod executor;
pub mod limits;

pub use executor::{run_step, PipelineExecutor, SandboxExecutor};
pub use limits::{ResourceLimits, DEFAULT_ADDRESS_SPACE_BYTES, DEFAULT_CPU_SECONDS};
