//! Engine configuration.
//!
//! Every section has defaults so partial TOML files are valid:
//!
//! ```toml
//! excerpt_bytes = 2000
//!
//! [timeouts]
//! test = 600
//!
//! [limits]
//! address_space_bytes = 536870912
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acceptance::AcceptancePolicy;
use crate::constraints::ConstraintPolicy;
use crate::domain::{AutotuneError, PipelineStep, Result};
use crate::patch::PatchToolConfig;
use crate::sandbox::ResourceLimits;

/// Wall-clock timeouts per pipeline step, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StepTimeouts {
    pub install: u64,
    pub build: u64,
    pub typecheck: u64,
    pub test: u64,
    pub bench: u64,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            install: 900,
            build: 900,
            typecheck: 600,
            test: 1200,
            bench: 1200,
        }
    }
}

impl StepTimeouts {
    pub fn for_step(&self, step: PipelineStep) -> Duration {
        let secs = match step {
            PipelineStep::Install => self.install,
            PipelineStep::Build => self.build,
            PipelineStep::Typecheck => self.typecheck,
            PipelineStep::Test => self.test,
            PipelineStep::Bench => self.bench,
        };
        Duration::from_secs(secs)
    }

    /// Same timeout for every step. Mostly useful in tests.
    pub fn uniform(secs: u64) -> Self {
        Self {
            install: secs,
            build: secs,
            typecheck: secs,
            test: secs,
            bench: secs,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub timeouts: StepTimeouts,
    pub limits: ResourceLimits,
    pub constraints: ConstraintPolicy,
    pub acceptance: AcceptancePolicy,
    pub patch: PatchToolConfig,
    /// Bytes of stdout/stderr tail kept in failure excerpts.
    pub excerpt_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: StepTimeouts::default(),
            limits: ResourceLimits::default(),
            constraints: ConstraintPolicy::default(),
            acceptance: AcceptancePolicy::default(),
            patch: PatchToolConfig::default(),
            excerpt_bytes: 4000,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would make the engine misbehave silently.
    pub fn validate(&self) -> Result<()> {
        for step in PipelineStep::ALL {
            if self.timeouts.for_step(step).is_zero() {
                return Err(AutotuneError::Config(format!(
                    "timeouts.{step} must be greater than zero"
                )));
            }
        }
        if self.constraints.max_files == 0 {
            return Err(AutotuneError::Config(
                "constraints.max_files must be greater than zero".to_string(),
            ));
        }
        let tolerance = self.acceptance.regression_tolerance;
        if !(0.0..1.0).contains(&tolerance) {
            return Err(AutotuneError::Config(format!(
                "acceptance.regression_tolerance must be in [0, 1), got {tolerance}"
            )));
        }
        if self.patch.binary.trim().is_empty() {
            return Err(AutotuneError::Config("patch.binary must not be empty".to_string()));
        }
        Ok(())
    }
}
