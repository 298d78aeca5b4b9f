//! Strategy settings and concrete per-attempt execution plans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::detection::DetectionResult;

/// Upper bound on attempts per baseline, regardless of configuration.
pub const MAX_ATTEMPTS_CAP: u32 = 3;

/// One stage of the repository pipeline.
///
/// Declaration order is the fixed execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Install,
    Build,
    Typecheck,
    Test,
    Bench,
}

impl PipelineStep {
    /// Full pipeline in execution order.
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Install,
        PipelineStep::Build,
        PipelineStep::Typecheck,
        PipelineStep::Test,
        PipelineStep::Bench,
    ];

    /// Steps re-run when validating a candidate patch.
    pub const CANDIDATE: [PipelineStep; 4] = [
        PipelineStep::Build,
        PipelineStep::Typecheck,
        PipelineStep::Test,
        PipelineStep::Bench,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::Install => "install",
            PipelineStep::Build => "build",
            PipelineStep::Typecheck => "typecheck",
            PipelineStep::Test => "test",
            PipelineStep::Bench => "bench",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PipelineStep::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Execution mode for establishing a baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Run the detected configuration once, whatever happens.
    Strict,
    /// Replan on classified failures, bounded by `max_attempts`.
    #[default]
    Adaptive,
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyMode::Strict => f.write_str("strict"),
            StrategyMode::Adaptive => f.write_str("adaptive"),
        }
    }
}

impl std::str::FromStr for StrategyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(StrategyMode::Strict),
            "adaptive" => Ok(StrategyMode::Adaptive),
            other => Err(format!("unknown strategy mode '{other}'")),
        }
    }
}

#[derive(Deserialize)]
struct RawStrategySettings {
    #[serde(default)]
    mode: StrategyMode,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS_CAP
}

impl From<RawStrategySettings> for StrategySettings {
    fn from(raw: RawStrategySettings) -> Self {
        StrategySettings::new(raw.mode, raw.max_attempts)
    }
}

/// Per-run strategy settings.
///
/// `max_attempts` is always within `1..=MAX_ATTEMPTS_CAP`, including after
/// deserialization of out-of-range input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawStrategySettings")]
pub struct StrategySettings {
    pub mode: StrategyMode,
    max_attempts: u32,
}

impl StrategySettings {
    pub fn new(mode: StrategyMode, max_attempts: u32) -> Self {
        Self {
            mode,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CAP),
        }
    }

    pub fn strict() -> Self {
        Self::new(StrategyMode::Strict, 1)
    }

    pub fn adaptive(max_attempts: u32) -> Self {
        Self::new(StrategyMode::Adaptive, max_attempts)
    }

    /// Configured attempt budget (already clamped).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts the engine may actually perform: always 1 in strict mode.
    pub fn effective_attempts(&self) -> u32 {
        match self.mode {
            StrategyMode::Strict => 1,
            StrategyMode::Adaptive => self.max_attempts,
        }
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self::adaptive(MAX_ATTEMPTS_CAP)
    }
}

/// Concrete command plan for one attempt.
///
/// Built fresh for each attempt and never mutated afterwards; adapters derive
/// a revised plan by copying the previous one through [`ExecutionAttemptPlan::revise`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionAttemptPlan {
    pub attempt: u32,
    pub mode: StrategyMode,
    pub install_cmd: Option<String>,
    pub build_cmd: Option<String>,
    pub typecheck_cmd: Option<String>,
    pub test_cmd: Option<String>,
    pub bench_cmd: Option<String>,

    /// Per-step environment overrides layered over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<PipelineStep, BTreeMap<String, String>>,

    /// Why this plan differs from the previous one.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ExecutionAttemptPlan {
    /// The unmodified plan for attempt 1, straight from detection.
    pub fn from_detection(detection: &DetectionResult, mode: StrategyMode) -> Self {
        Self {
            attempt: 1,
            mode,
            install_cmd: non_empty(&detection.install_cmd),
            build_cmd: non_empty(&detection.build_cmd),
            typecheck_cmd: non_empty(&detection.typecheck_cmd),
            test_cmd: non_empty(&detection.test_cmd),
            bench_cmd: non_empty(&detection.bench_cmd),
            env: BTreeMap::new(),
            metadata: serde_json::json!({ "source": "detection" }),
        }
    }

    /// Start the next attempt's plan from this one.
    ///
    /// Commands and environment carry over; attempt number and mode are
    /// advanced and metadata is reset for the adapter to fill in.
    pub fn revise(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            mode: StrategyMode::Adaptive,
            install_cmd: self.install_cmd.clone(),
            build_cmd: self.build_cmd.clone(),
            typecheck_cmd: self.typecheck_cmd.clone(),
            test_cmd: self.test_cmd.clone(),
            bench_cmd: self.bench_cmd.clone(),
            env: self.env.clone(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn command(&self, step: PipelineStep) -> Option<&str> {
        let cmd = match step {
            PipelineStep::Install => &self.install_cmd,
            PipelineStep::Build => &self.build_cmd,
            PipelineStep::Typecheck => &self.typecheck_cmd,
            PipelineStep::Test => &self.test_cmd,
            PipelineStep::Bench => &self.bench_cmd,
        };
        cmd.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn command_mut(&mut self, step: PipelineStep) -> &mut Option<String> {
        match step {
            PipelineStep::Install => &mut self.install_cmd,
            PipelineStep::Build => &mut self.build_cmd,
            PipelineStep::Typecheck => &mut self.typecheck_cmd,
            PipelineStep::Test => &mut self.test_cmd,
            PipelineStep::Bench => &mut self.bench_cmd,
        }
    }

    pub fn env_for(&self, step: PipelineStep) -> Option<&BTreeMap<String, String>> {
        self.env.get(&step)
    }

    pub fn set_env(&mut self, step: PipelineStep, key: &str, value: &str) {
        self.env
            .entry(step)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Steps from `steps` that have a command in this plan, in order.
    pub fn runnable(&self, steps: &[PipelineStep]) -> Vec<PipelineStep> {
        steps
            .iter()
            .copied()
            .filter(|s| self.command(*s).is_some())
            .collect()
    }

    /// Whether two plans would execute the same commands with the same env.
    pub fn same_execution(&self, other: &Self) -> bool {
        PipelineStep::ALL
            .iter()
            .all(|s| self.command(*s) == other.command(*s))
            && self.env == other.env
    }

    /// Reason codes already remediated along this plan's lineage.
    pub fn applied_remediations(&self) -> Vec<String> {
        self.metadata
            .get("remediations")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn non_empty(cmd: &Option<String>) -> Option<String> {
    cmd.as_ref()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_clamped_on_construction() {
        assert_eq!(StrategySettings::adaptive(0).max_attempts(), 1);
        assert_eq!(StrategySettings::adaptive(2).max_attempts(), 2);
        assert_eq!(StrategySettings::adaptive(99).max_attempts(), 3);
    }

    #[test]
    fn test_settings_clamped_on_deserialize() {
        let s: StrategySettings =
            serde_json::from_str(r#"{"mode":"adaptive","max_attempts":10}"#).unwrap();
        assert_eq!(s.max_attempts(), 3);
        let s: StrategySettings = serde_json::from_str(r#"{"mode":"strict"}"#).unwrap();
        assert_eq!(s.mode, StrategyMode::Strict);
        assert_eq!(s.effective_attempts(), 1);
    }

    #[test]
    fn test_strict_effective_attempts_is_one() {
        let s = StrategySettings::new(StrategyMode::Strict, 3);
        assert_eq!(s.max_attempts(), 3);
        assert_eq!(s.effective_attempts(), 1);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("STRICT".parse::<StrategyMode>().unwrap(), StrategyMode::Strict);
        assert!("yolo".parse::<StrategyMode>().is_err());
    }

    #[test]
    fn test_plan_from_detection_drops_blank_commands() {
        let det = DetectionResult {
            install_cmd: Some("npm ci".to_string()),
            build_cmd: Some("   ".to_string()),
            test_cmd: Some("npm test".to_string()),
            ..Default::default()
        };
        let plan = ExecutionAttemptPlan::from_detection(&det, StrategyMode::Strict);
        assert_eq!(plan.attempt, 1);
        assert_eq!(plan.command(PipelineStep::Install), Some("npm ci"));
        assert_eq!(plan.command(PipelineStep::Build), None);
        assert_eq!(
            plan.runnable(&PipelineStep::ALL),
            vec![PipelineStep::Install, PipelineStep::Test]
        );
    }

    #[test]
    fn test_revise_advances_attempt_and_keeps_commands() {
        let det = DetectionResult {
            test_cmd: Some("cargo test".to_string()),
            ..Default::default()
        };
        let first = ExecutionAttemptPlan::from_detection(&det, StrategyMode::Adaptive);
        let mut second = first.revise();
        assert_eq!(second.attempt, 2);
        assert!(second.same_execution(&first));

        second.set_env(PipelineStep::Test, "RUST_TEST_THREADS", "1");
        assert!(!second.same_execution(&first));
        assert_eq!(
            second
                .env_for(PipelineStep::Test)
                .and_then(|e| e.get("RUST_TEST_THREADS"))
                .map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_plan_env_serde_roundtrip() {
        let det = DetectionResult {
            build_cmd: Some("make".to_string()),
            ..Default::default()
        };
        let mut plan = ExecutionAttemptPlan::from_detection(&det, StrategyMode::Adaptive);
        plan.set_env(PipelineStep::Build, "MAKEFLAGS", "-j1");
        let json = serde_json::to_string(&plan).unwrap();
        let back: ExecutionAttemptPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }

    #[test]
    fn test_step_names_roundtrip() {
        for step in PipelineStep::ALL {
            assert_eq!(PipelineStep::from_name(step.name()), Some(step));
        }
        assert_eq!(PipelineStep::from_name("lint"), None);
    }
}
