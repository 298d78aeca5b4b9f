//! Benchmark comparisons and acceptance verdicts.

use serde::{Deserialize, Serialize};

use super::result::BenchResult;

/// Which way a benchmark moved, taking the metric's direction into account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkDirection {
    Improved,
    Regressed,
    Unchanged,
}

/// Before/after values of one benchmark metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkComparison {
    pub metric: String,
    pub before: f64,
    pub after: f64,
    /// `after - before`.
    pub absolute_delta: f64,
    /// `(after - before) / |before|`.
    pub relative_delta: f64,
    pub direction: BenchmarkDirection,
    pub lower_is_better: bool,
}

impl BenchmarkComparison {
    /// Compare two measurements of the same metric.
    ///
    /// Returns `None` when the metrics differ in name or direction, or when a
    /// value is not finite.
    pub fn between(before: &BenchResult, after: &BenchResult) -> Option<Self> {
        if before.metric != after.metric || before.lower_is_better != after.lower_is_better {
            return None;
        }
        if !before.value.is_finite() || !after.value.is_finite() {
            return None;
        }

        let absolute_delta = after.value - before.value;
        let relative_delta = if before.value == 0.0 {
            if absolute_delta == 0.0 {
                0.0
            } else {
                absolute_delta.signum()
            }
        } else {
            absolute_delta / before.value.abs()
        };

        let comparison = Self {
            metric: before.metric.clone(),
            before: before.value,
            after: after.value,
            absolute_delta,
            relative_delta,
            direction: BenchmarkDirection::Unchanged,
            lower_is_better: before.lower_is_better,
        };
        let improvement = comparison.improvement();
        let direction = if improvement > f64::EPSILON {
            BenchmarkDirection::Improved
        } else if improvement < -f64::EPSILON {
            BenchmarkDirection::Regressed
        } else {
            BenchmarkDirection::Unchanged
        };
        Some(Self {
            direction,
            ..comparison
        })
    }

    /// Relative improvement: positive is better, negative is a regression.
    pub fn improvement(&self) -> f64 {
        if self.lower_is_better {
            -self.relative_delta
        } else {
            self.relative_delta
        }
    }
}

/// How much trust to place in an accepted candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Final accept/reject decision for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceVerdict {
    pub accepted: bool,
    pub confidence: Confidence,
    /// Risk score in [0, 1], carried over from the opportunity.
    pub risk_score: f32,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub benchmark: Option<BenchmarkComparison>,
}
