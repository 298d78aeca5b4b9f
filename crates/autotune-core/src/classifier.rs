//! Failure classification for failed pipeline attempts.
//!
//! Maps the first failing step of a [`BaselineResult`] to a normalized
//! [`FailureReasonCode`] by matching case-folded output against ordered
//! keyword groups. The first matching group wins.

use crate::domain::{BaselineResult, FailureReasonCode, PipelineStep, StepFailure};

/// Default size of the stdout/stderr tail kept in a [`StepFailure`].
pub const DEFAULT_EXCERPT_BYTES: usize = 4000;

const OOM_PHRASES: &[&str] = &[
    "out of memory",
    "javascript heap out of memory",
    "heap out of memory",
    "outofmemoryerror",
    "cannot allocate memory",
    "memory allocation failed",
    "memoryerror",
    "killed signal terminated program",
    "fatal runtime error: out of memory",
    "std::bad_alloc",
    "oom-kill",
    "oomkilled",
    "exit code 137",
];

const LOCKFILE_PHRASES: &[&str] = &[
    "lockfile needs to be updated",
    "lockfile would have been modified",
    "outdated_lockfile",
    "package-lock.json",
    "frozen-lockfile",
    "npm ci can only install",
    "are not in sync",
    "poetry.lock is not consistent",
    "pipfile.lock",
    "the lock file is out of date",
    "needs to be updated but --locked was passed",
    "cannot update the lock file",
    "go.sum",
    "missing go.sum entry",
    "updates to go.mod needed",
    "gemfile.lock",
    "frozen mode",
    "you are trying to install in deployment mode",
];

/// Test and typecheck runners normally installed as dev dependencies.
const DEV_TOOLS: &[&str] = &[
    "jest",
    "vitest",
    "mocha",
    "tsc",
    "eslint",
    "pytest",
    "mypy",
    "rspec",
    "ts-node",
    "karma",
];

/// Unambiguous on their own.
const COMMAND_NOT_FOUND_PHRASES: &[&str] = &[
    "command not found",
    "is not recognized as an internal or external command",
];

/// Only a missing command when the line also names a shell, wrapper or
/// dev tool; otherwise usually a missing fixture or import.
const MISSING_PATH_PHRASES: &[&str] = &[
    "not found",
    "no such file or directory",
    "cannot find module",
    "no module named",
];

/// Shells and launchers that prefix their own errors, e.g. `sh: 1: make: not found`.
const SHELLS: &[&str] = &["sh", "bash", "dash", "zsh", "ksh", "env"];

const WRAPPERS: &[&str] = &["gradlew", "mvnw"];

const ENGINE_PHRASES: &[&str] = &[
    "unsupported engine",
    "engine \"node\" is incompatible",
    "the engine \"node\" is incompatible",
    "ebadengine",
    "requires python",
    "requires-python",
    "unsupported class file major version",
    "has been compiled by a more recent version of the java runtime",
    "requires rustc",
    "package requires go",
    "go.mod requires go",
    "your ruby version is",
    "requires a newer version of",
];

/// Classify `result` with the default excerpt size.
pub fn classify(result: &BaselineResult) -> StepFailure {
    classify_with_excerpt(result, DEFAULT_EXCERPT_BYTES)
}

/// Classify `result`, keeping at most `excerpt_bytes` of each stream's tail.
///
/// Returns [`StepFailure::unknown`] when no step failed.
pub fn classify_with_excerpt(result: &BaselineResult, excerpt_bytes: usize) -> StepFailure {
    let Some(failed) = result.first_failure() else {
        return StepFailure::unknown();
    };

    let haystack = failed.combined_output().to_lowercase();
    let step = failed.pipeline_step();
    let reason = reason_for(step, &haystack);

    StepFailure {
        step: failed.step.clone(),
        reason,
        stdout_excerpt: tail(&failed.stdout, excerpt_bytes).to_string(),
        stderr_excerpt: tail(&failed.stderr, excerpt_bytes).to_string(),
    }
}

fn reason_for(step: Option<PipelineStep>, output: &str) -> FailureReasonCode {
    if contains_any(output, OOM_PHRASES) {
        return if step == Some(PipelineStep::Test) {
            FailureReasonCode::ConcurrencyOom
        } else {
            FailureReasonCode::Oom
        };
    }
    if contains_any(output, LOCKFILE_PHRASES) {
        return FailureReasonCode::LockfileDrift;
    }
    if missing_dev_tool(output) {
        return FailureReasonCode::MissingDevDependencies;
    }
    if missing_command(output) {
        return if contains_any(output, WRAPPERS) {
            FailureReasonCode::WrapperMissing
        } else {
            FailureReasonCode::CommandNotFound
        };
    }
    if contains_any(output, ENGINE_PHRASES) {
        return FailureReasonCode::EngineMismatch;
    }
    match step {
        Some(PipelineStep::Install) => FailureReasonCode::InstallFailed,
        Some(PipelineStep::Build) => FailureReasonCode::BuildFailed,
        Some(PipelineStep::Typecheck) => FailureReasonCode::TypecheckFailed,
        Some(PipelineStep::Test) => FailureReasonCode::TestFailed,
        Some(PipelineStep::Bench) | None => FailureReasonCode::Unknown,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// A dev tool named next to a "not found" phrase, e.g. `sh: jest: not found`
/// or `No module named pytest`.
fn missing_dev_tool(output: &str) -> bool {
    output.lines().any(|line| {
        let not_found = contains_any(line, COMMAND_NOT_FOUND_PHRASES)
            || contains_any(line, MISSING_PATH_PHRASES);
        not_found && DEV_TOOLS.iter().any(|tool| mentions_word(line, tool))
    })
}

/// A line reporting that a command or wrapper could not be run.
fn missing_command(output: &str) -> bool {
    output.lines().any(|line| {
        contains_any(line, COMMAND_NOT_FOUND_PHRASES)
            || (contains_any(line, MISSING_PATH_PHRASES)
                && (shell_reported(line) || contains_any(line, WRAPPERS)))
    })
}

/// `sh: ...`, `/bin/bash: line 1: ...` and the like.
fn shell_reported(line: &str) -> bool {
    let Some((head, _)) = line.trim_start().split_once(':') else {
        return false;
    };
    let program = head.rsplit('/').next().unwrap_or(head);
    SHELLS.contains(&program)
}

fn mentions_word(line: &str, word: &str) -> bool {
    line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .any(|token| token == word)
}

/// Last `max_bytes` of `s`, moved forward to a char boundary.
pub fn tail(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
