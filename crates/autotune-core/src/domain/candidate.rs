//! Candidate patches handed over by the scanner/agent collaborators.

use serde::{Deserialize, Serialize};

use crate::patch::diff;

/// Risk level assigned by the opportunity scanner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn score(&self) -> f32 {
        match self {
            RiskLevel::Low => 0.2,
            RiskLevel::Medium => 0.5,
            RiskLevel::High => 0.8,
        }
    }
}

/// A located optimization opportunity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: String,

    /// Opportunity kind, e.g. "memoization", "n_plus_one".
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Human-readable location, e.g. "src/app.ts:42".
    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub rationale: String,

    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Explicit score overriding the level's default.
    #[serde(default)]
    pub risk_score: Option<f32>,
}

impl Opportunity {
    /// Risk score in [0, 1] carried into the acceptance verdict.
    pub fn effective_risk_score(&self) -> f32 {
        match self.risk_score {
            Some(score) if score.is_finite() => score.clamp(0.0, 1.0),
            _ => self.risk_level.score(),
        }
    }
}

/// A generated patch: diff text plus its shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatchResult {
    pub diff: String,
    #[serde(default)]
    pub touched_files: Vec<String>,
    #[serde(default)]
    pub lines_changed: usize,
}

impl PatchResult {
    /// Build a patch from raw diff text, deriving its shape.
    pub fn from_diff(diff_text: impl Into<String>) -> Self {
        let diff_text = diff_text.into();
        Self {
            touched_files: diff::touched_files(&diff_text),
            lines_changed: diff::count_diff_lines(&diff_text),
            diff: diff_text,
        }
    }

    /// Reported touched files plus every path the diff headers edit,
    /// de-duplicated in first-seen order.
    ///
    /// The diff is what gets applied, so a reported list can add paths but
    /// never hide one.
    pub fn effective_touched_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        let reported = self.touched_files.iter().map(|f| f.trim().trim_start_matches("./"));
        let from_diff = diff::touched_files(&self.diff);
        for path in reported.chain(from_diff.iter().map(String::as_str)) {
            if !path.is_empty() && !files.iter().any(|f| f == path) {
                files.push(path.to_string());
            }
        }
        files
    }
}

/// An opportunity paired with the patch that implements it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub opportunity: Opportunity,
    pub patch: PatchResult,
}

impl Candidate {
    pub fn id(&self) -> &str {
        &self.opportunity.id
    }
}

/// Identifier of a violated patch-shape constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintId {
    MaxFiles,
    MaxLines,
    ForbiddenFile,
}

impl ConstraintId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintId::MaxFiles => "max_files",
            ConstraintId::MaxLines => "max_lines",
            ConstraintId::ForbiddenFile => "forbidden_file",
        }
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patch failed the static safety gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("constraint {constraint} violated: {detail}")]
pub struct ConstraintViolation {
    pub constraint: ConstraintId,
    pub detail: String,
}

impl ConstraintViolation {
    pub fn new(constraint: ConstraintId, detail: impl Into<String>) -> Self {
        Self {
            constraint,
            detail: detail.into(),
        }
    }
}
