//! Constraint gate: static safety checks on a candidate patch.
//!
//! Runs before anything touches the filesystem. Checks are ordered and the
//! first violation wins:
//!
//! 1. too many touched files (`max_files`)
//! 2. too many changed lines (`max_lines`)
//! 3. a touched path is a manifest, lockfile, build config, env file or test
//!    file (`forbidden_file`), whatever the patch size

use serde::{Deserialize, Serialize};

use crate::domain::{ConstraintId, ConstraintViolation, PatchResult};
use crate::patch::count_diff_lines;

/// Thresholds and forbidden path patterns for the gate.
///
/// Patterns are matched case-insensitively against `/`-separated paths
/// relative to the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConstraintPolicy {
    pub max_files: usize,
    pub max_lines: usize,
    /// File names matched against the last path component(s).
    pub forbidden_suffixes: Vec<String>,
    /// Fragments matched anywhere in the path (a leading `/` anchors to a
    /// path component boundary, including the repository root).
    pub forbidden_substrings: Vec<String>,
}

const MANIFESTS: &[&str] = &[
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "cargo.toml",
    "cargo.lock",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "pipfile",
    "pipfile.lock",
    "gemfile",
    "gemfile.lock",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "settings.gradle.kts",
];

const BUILD_CONFIGS: &[&str] = &[
    "cmakelists.txt",
    "makefile",
    "tsconfig.json",
    "webpack.config.js",
    "webpack.config.ts",
    "vite.config.js",
    "vite.config.ts",
    "setup.py",
    "setup.cfg",
    ".env",
];

const TEST_AND_ENV_FRAGMENTS: &[&str] = &[
    "/.env.",
    "/test/",
    "/tests/",
    "/__tests__/",
    "/spec/",
    "/test_",
    "_test.",
    ".test.",
    ".spec.",
];

impl Default for ConstraintPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_lines: 200,
            forbidden_suffixes: MANIFESTS
                .iter()
                .chain(BUILD_CONFIGS)
                .map(|s| s.to_string())
                .collect(),
            forbidden_substrings: TEST_AND_ENV_FRAGMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ConstraintPolicy {
    /// The pattern that forbids `path`, if any.
    pub fn forbidden_match(&self, path: &str) -> Option<&str> {
        let normalized = normalize(path);
        if let Some(suffix) = self.forbidden_suffixes.iter().find(|suffix| {
            let suffix = suffix.to_ascii_lowercase();
            let suffix = suffix.trim_start_matches('/');
            normalized.ends_with(&format!("/{suffix}"))
        }) {
            return Some(suffix.as_str());
        }
        self.forbidden_substrings
            .iter()
            .find(|fragment| normalized.contains(&fragment.to_ascii_lowercase()))
            .map(String::as_str)
    }
}

/// Apply the gate to `patch`. Pure; the filesystem is never consulted.
pub fn enforce_constraints(
    patch: &PatchResult,
    policy: &ConstraintPolicy,
) -> Result<(), ConstraintViolation> {
    let files = patch.effective_touched_files();
    if files.len() > policy.max_files {
        return Err(ConstraintViolation::new(
            ConstraintId::MaxFiles,
            format!("{} files touched, limit is {}", files.len(), policy.max_files),
        ));
    }

    let lines = count_diff_lines(&patch.diff);
    if lines > policy.max_lines {
        return Err(ConstraintViolation::new(
            ConstraintId::MaxLines,
            format!("{lines} lines changed, limit is {}", policy.max_lines),
        ));
    }

    for file in &files {
        if let Some(pattern) = policy.forbidden_match(file) {
            return Err(ConstraintViolation::new(
                ConstraintId::ForbiddenFile,
                format!("{file} matches forbidden pattern '{pattern}'"),
            ));
        }
    }
    Ok(())
}

/// Lower-case, forward slashes, and a leading `/` so root-level files match
/// component-anchored patterns.
fn normalize(path: &str) -> String {
    let path = path.trim().replace('\\', "/").to_ascii_lowercase();
    let path = path.trim_start_matches("./");
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
