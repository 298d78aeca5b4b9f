//! Ecosystem adapters: per-language replanning after a classified failure.
//!
//! Dispatch is a closed enum. Every adapter shares the same two operations:
//! the strict plan (detection as-is) and the adaptive plan (previous plan plus
//! one remediation for the failure's reason code).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::rewrite::{
    append_args, append_passthrough, has_token, has_token_prefix, insert_after_pair,
    prepend_command, remove_flag, remove_flag_with_value, replace_pair, replace_token,
};
use crate::domain::{
    DetectionResult, ExecutionAttemptPlan, FailureReasonCode, Language, PipelineStep,
    StepFailure, StrategyMode,
};

use crate::domain::FailureReasonCode as R;
use crate::domain::PipelineStep as S;

/// Ecosystem-specific replanning strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EcosystemAdapter {
    Node,
    Python,
    Go,
    Jvm,
    Ruby,
    Rust,
    Cpp,
    /// No remediations; used for unknown stacks.
    Generic,
}

impl EcosystemAdapter {
    /// The adapter that natively handles `language`.
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Node => EcosystemAdapter::Node,
            Language::Python => EcosystemAdapter::Python,
            Language::Go => EcosystemAdapter::Go,
            Language::Jvm => EcosystemAdapter::Jvm,
            Language::Ruby => EcosystemAdapter::Ruby,
            Language::Rust => EcosystemAdapter::Rust,
            Language::Cpp => EcosystemAdapter::Cpp,
            Language::Unknown => EcosystemAdapter::Generic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EcosystemAdapter::Node => "node",
            EcosystemAdapter::Python => "python",
            EcosystemAdapter::Go => "go",
            EcosystemAdapter::Jvm => "jvm",
            EcosystemAdapter::Ruby => "ruby",
            EcosystemAdapter::Rust => "rust",
            EcosystemAdapter::Cpp => "cpp",
            EcosystemAdapter::Generic => "generic",
        }
    }

    /// Attempt 1: the detected commands, unmodified.
    pub fn build_strict_plan(&self, detection: &DetectionResult) -> ExecutionAttemptPlan {
        ExecutionAttemptPlan::from_detection(detection, StrategyMode::Strict)
    }

    /// Derive the next attempt's plan from `previous` and its classified failure.
    ///
    /// Returns `None` when this adapter has no remediation for the reason, when
    /// the reason was already remediated along this plan's lineage, or when
    /// the remediation would not change what gets executed.
    pub fn build_adaptive_plan(
        &self,
        detection: &DetectionResult,
        previous: &ExecutionAttemptPlan,
        failure: &StepFailure,
    ) -> Option<ExecutionAttemptPlan> {
        let mut applied = previous.applied_remediations();
        if applied.iter().any(|r| r == failure.reason.as_str()) {
            return None;
        }

        let mut plan = previous.revise();
        let remediation = match self {
            EcosystemAdapter::Node => remediate_node(detection, &mut plan, failure.reason),
            EcosystemAdapter::Python => remediate_python(detection, &mut plan, failure.reason),
            EcosystemAdapter::Go => remediate_go(&mut plan, failure.reason),
            EcosystemAdapter::Jvm => remediate_jvm(&mut plan, failure.reason),
            EcosystemAdapter::Ruby => remediate_ruby(&mut plan, failure.reason),
            EcosystemAdapter::Rust => remediate_rust(&mut plan, failure.reason),
            EcosystemAdapter::Cpp => remediate_cpp(&mut plan, failure.reason),
            EcosystemAdapter::Generic => None,
        }?;

        if plan.same_execution(previous) {
            return None;
        }

        applied.push(failure.reason.as_str().to_string());
        plan.metadata = serde_json::json!({
            "adapter": self.name(),
            "reason": failure.reason.as_str(),
            "failed_step": failure.step,
            "remediation": remediation,
            "previous_attempt": previous.attempt,
            "remediations": applied,
        });
        Some(plan)
    }
}

// ---------------------------------------------------------------------------
// Plan editing helpers
// ---------------------------------------------------------------------------

/// Rewrite the command for `step` in place. Returns `false` if it has none.
fn rewrite(plan: &mut ExecutionAttemptPlan, step: PipelineStep, f: impl FnOnce(&str) -> String) -> bool {
    let Some(current) = plan.command(step) else {
        return false;
    };
    let next = f(current);
    *plan.command_mut(step) = Some(next);
    true
}

fn set_env_where_present(plan: &mut ExecutionAttemptPlan, steps: &[PipelineStep], key: &str, value: &str) {
    for step in plan.runnable(steps) {
        plan.set_env(step, key, value);
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

fn remediate_node(
    detection: &DetectionResult,
    plan: &mut ExecutionAttemptPlan,
    reason: FailureReasonCode,
) -> Option<&'static str> {
    match reason {
        R::LockfileDrift => {
            let install = plan.command(S::Install)?.to_string();
            let mut next = replace_pair(&install, "npm", "ci", "npm install");
            next = remove_flag(&next, "--frozen-lockfile");
            next = remove_flag(&next, "--immutable");
            if has_token(&next, "pnpm") && !has_token(&next, "--no-frozen-lockfile") {
                next = append_args(&next, "--no-frozen-lockfile");
            }
            *plan.command_mut(S::Install) = Some(next);
            if detection.uses("yarn") || has_token(&install, "yarn") {
                plan.set_env(S::Install, "YARN_ENABLE_IMMUTABLE_INSTALLS", "false");
            }
            Some("relax frozen lockfile install")
        }
        R::Oom | R::ConcurrencyOom => {
            set_env_where_present(plan, &PipelineStep::ALL, "NODE_OPTIONS", "--max-old-space-size=4096");
            let jest = detection
                .framework
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case("jest"))
                || plan.command(S::Test).is_some_and(|t| t.contains("jest"));
            let flag = if jest { "--runInBand" } else { "--maxWorkers=1" };
            if plan.command(S::Test).is_some_and(|t| !has_token(t, flag)) {
                rewrite(plan, S::Test, |t| append_passthrough(t, flag));
            }
            Some("raise node heap limit and serialize tests")
        }
        R::MissingDevDependencies => {
            let pm = detection.package_manager.as_deref().unwrap_or("npm");
            let install = plan
                .command(S::Install)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{pm} install"));
            let mut next = remove_flag(&install, "--production");
            next = remove_flag(&next, "--prod");
            next = remove_flag(&next, "--omit");
            if has_token(&next, "npm") && !has_token_prefix(&next, "--include=dev") {
                next = append_args(&next, "--include=dev");
            }
            *plan.command_mut(S::Install) = Some(next);
            plan.set_env(S::Install, "NODE_ENV", "development");
            plan.set_env(S::Install, "NPM_CONFIG_PRODUCTION", "false");
            Some("install dev dependencies")
        }
        R::EngineMismatch => {
            let install = plan.command(S::Install)?.to_string();
            if (detection.uses("yarn") || has_token(&install, "yarn"))
                && !has_token(&install, "--ignore-engines")
            {
                *plan.command_mut(S::Install) = Some(append_args(&install, "--ignore-engines"));
            }
            plan.set_env(S::Install, "npm_config_engine_strict", "false");
            Some("disable engine strictness")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

const PIP_INSTALL_PYTEST: &str = "python -m pip install pytest";

fn remediate_python(
    detection: &DetectionResult,
    plan: &mut ExecutionAttemptPlan,
    reason: FailureReasonCode,
) -> Option<&'static str> {
    match reason {
        R::MissingDevDependencies | R::CommandNotFound => {
            let install = match plan.command(S::Install) {
                Some(cmd) if cmd.contains(PIP_INSTALL_PYTEST) => cmd.to_string(),
                Some(cmd) => format!("{cmd} && {PIP_INSTALL_PYTEST}"),
                None => PIP_INSTALL_PYTEST.to_string(),
            };
            *plan.command_mut(S::Install) = Some(install);
            let test = match plan.command(S::Test) {
                Some(cmd) => replace_token(cmd, "pytest", "python -m pytest"),
                None => "python -m pytest".to_string(),
            };
            *plan.command_mut(S::Test) = Some(test);
            Some("install pytest and run it as a module")
        }
        R::LockfileDrift => {
            let install = plan.command(S::Install).unwrap_or_default().to_string();
            if detection.uses("poetry") || install.contains("poetry") {
                *plan.command_mut(S::Install) =
                    Some("poetry lock --no-update && poetry install".to_string());
                Some("regenerate poetry lock without upgrades")
            } else if detection.uses("pipenv") || install.contains("pipenv") {
                let next = if has_token(&install, "--dev") {
                    "pipenv install --dev --skip-lock"
                } else {
                    "pipenv install --skip-lock"
                };
                *plan.command_mut(S::Install) = Some(next.to_string());
                Some("install without the pipenv lock")
            } else {
                None
            }
        }
        R::ConcurrencyOom => {
            let test = plan.command(S::Test)?;
            if !test.contains("pytest") || test.contains("no:xdist") {
                return None;
            }
            rewrite(plan, S::Test, |t| {
                let t = remove_flag_with_value(t, "-n");
                let t = remove_flag_with_value(&t, "--numprocesses");
                append_args(&t, "-p no:xdist")
            });
            Some("run pytest without xdist workers")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn remediate_go(plan: &mut ExecutionAttemptPlan, reason: FailureReasonCode) -> Option<&'static str> {
    match reason {
        R::Oom | R::ConcurrencyOom => {
            if let Some(test) = plan.command(S::Test) {
                if !has_token(test, "-p") {
                    if let Some(next) = insert_after_pair(test, "go", "test", "-p 1") {
                        *plan.command_mut(S::Test) = Some(next);
                    }
                }
            }
            let steps = [S::Build, S::Test, S::Bench];
            set_env_where_present(plan, &steps, "GOFLAGS", "-p=1");
            set_env_where_present(plan, &steps, "GOGC", "50");
            Some("serialize go builds and tests, tighten gc")
        }
        R::LockfileDrift => {
            let install = match plan.command(S::Install) {
                Some(cmd) if cmd.contains("go mod tidy") => return None,
                Some(cmd) => prepend_command("go mod tidy", cmd),
                None => "go mod tidy && go mod download".to_string(),
            };
            *plan.command_mut(S::Install) = Some(install);
            Some("tidy go.mod and go.sum before download")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// JVM
// ---------------------------------------------------------------------------

fn is_gradle(cmd: &str) -> bool {
    cmd.contains("gradle")
}

fn is_maven(cmd: &str) -> bool {
    has_token(cmd, "mvn") || cmd.contains("mvnw")
}

fn remediate_jvm(plan: &mut ExecutionAttemptPlan, reason: FailureReasonCode) -> Option<&'static str> {
    match reason {
        R::WrapperMissing => {
            for step in plan.runnable(&PipelineStep::ALL) {
                rewrite(plan, step, |cmd| {
                    let cmd = replace_token(cmd, "./gradlew", "gradle");
                    let cmd = replace_token(&cmd, "gradlew", "gradle");
                    let cmd = replace_token(&cmd, "./mvnw", "mvn");
                    replace_token(&cmd, "mvnw", "mvn")
                });
            }
            Some("use system gradle/maven instead of the wrapper")
        }
        R::Oom | R::ConcurrencyOom => {
            for step in plan.runnable(&PipelineStep::ALL) {
                let Some(cmd) = plan.command(step).map(str::to_string) else {
                    continue;
                };
                if is_gradle(&cmd) {
                    plan.set_env(step, "GRADLE_OPTS", "-Xmx2g");
                    if !has_token_prefix(&cmd, "--max-workers") {
                        *plan.command_mut(step) = Some(append_args(&cmd, "--max-workers=1"));
                    }
                } else if is_maven(&cmd) {
                    plan.set_env(step, "MAVEN_OPTS", "-Xmx2g");
                    if step == S::Test && !has_token_prefix(&cmd, "-DforkCount") {
                        *plan.command_mut(step) = Some(append_args(&cmd, "-DforkCount=1"));
                    }
                }
            }
            Some("cap jvm heap and run workers serially")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Ruby
// ---------------------------------------------------------------------------

fn remediate_ruby(plan: &mut ExecutionAttemptPlan, reason: FailureReasonCode) -> Option<&'static str> {
    match reason {
        R::LockfileDrift => {
            let install = plan.command(S::Install)?.to_string();
            let next = remove_flag(&install, "--frozen");
            let next = remove_flag(&next, "--deployment");
            *plan.command_mut(S::Install) = Some(next);
            plan.set_env(S::Install, "BUNDLE_FROZEN", "false");
            plan.set_env(S::Install, "BUNDLE_DEPLOYMENT", "false");
            Some("allow bundler to update Gemfile.lock")
        }
        R::MissingDevDependencies | R::CommandNotFound => {
            if plan.command(S::Install).is_none() {
                *plan.command_mut(S::Install) = Some("bundle install".to_string());
            }
            plan.set_env(S::Install, "BUNDLE_WITHOUT", "");
            rewrite(plan, S::Test, |t| {
                if t.trim_start().starts_with("bundle ") {
                    t.to_string()
                } else {
                    format!("bundle exec {}", t.trim())
                }
            });
            Some("install all bundler groups and run via bundle exec")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

fn remediate_rust(plan: &mut ExecutionAttemptPlan, reason: FailureReasonCode) -> Option<&'static str> {
    match reason {
        R::LockfileDrift => {
            for step in plan.runnable(&PipelineStep::ALL) {
                rewrite(plan, step, |cmd| remove_flag(&remove_flag(cmd, "--locked"), "--frozen"));
            }
            Some("allow cargo to update Cargo.lock")
        }
        R::Oom | R::ConcurrencyOom => {
            set_env_where_present(plan, &PipelineStep::ALL, "CARGO_BUILD_JOBS", "1");
            if let Some(test) = plan.command(S::Test) {
                if test.contains("cargo") && !test.contains("--test-threads") {
                    let next = if has_token(test, "--") {
                        append_args(test, "--test-threads=1")
                    } else {
                        append_args(test, "-- --test-threads=1")
                    };
                    *plan.command_mut(S::Test) = Some(next);
                }
            }
            Some("single cargo job and single test thread")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// C++
// ---------------------------------------------------------------------------

static PARALLEL_JOBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\s)-j\s*\d+").expect("parallel jobs pattern is valid")
});

static PARALLEL_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--parallel(?:\s+|=)\d+").expect("parallel level pattern is valid")
});

fn remediate_cpp(plan: &mut ExecutionAttemptPlan, reason: FailureReasonCode) -> Option<&'static str> {
    match reason {
        R::Oom | R::ConcurrencyOom => {
            for step in plan.runnable(&PipelineStep::ALL) {
                rewrite(plan, step, |cmd| {
                    let cmd = PARALLEL_JOBS.replace_all(cmd, "${1}-j1");
                    PARALLEL_LEVEL.replace_all(&cmd, "--parallel 1").into_owned()
                });
            }
            let steps = [S::Build, S::Test, S::Bench];
            set_env_where_present(plan, &steps, "CMAKE_BUILD_PARALLEL_LEVEL", "1");
            set_env_where_present(plan, &steps, "CTEST_PARALLEL_LEVEL", "1");
            set_env_where_present(plan, &steps, "MAKEFLAGS", "-j1");
            Some("build and test with a single job")
        }
        _ => None,
    }
}
