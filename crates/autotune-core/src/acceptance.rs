//! Acceptance evaluation: decide whether a validated candidate is kept.

use serde::{Deserialize, Serialize};

use crate::domain::{
    AcceptanceVerdict, BaselineResult, BenchmarkComparison, CandidateResult, Confidence,
    Opportunity, PipelineStep,
};

/// Thresholds for accepting a candidate and grading confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcceptancePolicy {
    /// Largest tolerated relative benchmark regression (0.02 = 2%).
    pub regression_tolerance: f64,
    /// Relative improvement required for `high` confidence.
    pub high_improvement: f64,
    /// Relative improvement required for `medium` confidence.
    pub medium_improvement: f64,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            regression_tolerance: 0.02,
            high_improvement: 0.10,
            medium_improvement: 0.03,
        }
    }
}

/// Evaluate `candidate` against the `baseline` it was validated on.
///
/// Rejected when the candidate never ran, when a step that passed in the
/// baseline fails or is not reached, or when the shared benchmark regresses
/// beyond the tolerance. Rejections always carry `low` confidence.
pub fn evaluate_acceptance(
    baseline: &BaselineResult,
    candidate: &CandidateResult,
    opportunity: &Opportunity,
    policy: &AcceptancePolicy,
) -> AcceptanceVerdict {
    let risk_score = opportunity.effective_risk_score();
    let mut reasons: Vec<String> = Vec::new();

    if let Some(rejection) = &candidate.rejection {
        reasons.push(format!("rejected before execution: {rejection}"));
        return rejected(risk_score, reasons, None);
    }

    let mut broken = false;
    for step in PipelineStep::CANDIDATE {
        let passed_before = baseline.step(step).is_some_and(|s| s.is_success());
        if !passed_before {
            continue;
        }
        match candidate.step(step) {
            Some(s) if s.is_success() => {}
            Some(s) if s.timed_out => {
                broken = true;
                reasons.push(format!("{step} timed out after the patch"));
            }
            Some(s) => {
                broken = true;
                reasons.push(format!("{step} failed after the patch (exit code {})", s.exit_code));
            }
            None => {
                broken = true;
                reasons.push(format!("{step} was not reached after the patch"));
            }
        }
    }
    if !candidate.is_success && !broken {
        broken = true;
        reasons.push(
            candidate
                .error
                .clone()
                .unwrap_or_else(|| "candidate run did not succeed".to_string()),
        );
    }

    let benchmark = match (&baseline.bench_result, &candidate.bench_result) {
        (Some(before), Some(after)) => {
            let cmp = BenchmarkComparison::between(before, after);
            if cmp.is_none() {
                reasons.push(format!(
                    "benchmarks not comparable ({} vs {})",
                    before.metric, after.metric
                ));
            }
            cmp
        }
        _ => None,
    };

    if broken {
        return rejected(risk_score, reasons, benchmark);
    }

    if let Some(cmp) = &benchmark {
        let improvement = cmp.improvement();
        if improvement < -policy.regression_tolerance {
            reasons.push(format!(
                "{} regressed by {:.1}% (tolerance {:.1}%)",
                cmp.metric,
                -improvement * 100.0,
                policy.regression_tolerance * 100.0
            ));
            return rejected(risk_score, reasons, benchmark);
        }
        reasons.push(format!(
            "{}: {} -> {} ({:+.1}% improvement)",
            cmp.metric,
            cmp.before,
            cmp.after,
            improvement * 100.0
        ));
    }

    let validated: Vec<PipelineStep> = candidate
        .steps
        .iter()
        .filter(|s| s.is_success())
        .filter_map(|s| s.pipeline_step())
        .collect();
    reasons.push(format!("{} steps re-validated", validated.len()));

    let confidence = grade(benchmark.as_ref(), &validated, policy);
    AcceptanceVerdict {
        accepted: true,
        confidence,
        risk_score,
        reasons,
        benchmark,
    }
}

fn grade(
    benchmark: Option<&BenchmarkComparison>,
    validated: &[PipelineStep],
    policy: &AcceptancePolicy,
) -> Confidence {
    let steps = validated.len();
    match benchmark {
        Some(cmp) => {
            let improvement = cmp.improvement();
            if improvement >= policy.high_improvement && steps >= 3 {
                Confidence::High
            } else if improvement >= policy.medium_improvement && steps >= 2 {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
        None if steps >= 3 && validated.contains(&PipelineStep::Test) => Confidence::Medium,
        None => Confidence::Low,
    }
}

fn rejected(
    risk_score: f32,
    reasons: Vec<String>,
    benchmark: Option<BenchmarkComparison>,
) -> AcceptanceVerdict {
    AcceptanceVerdict {
        accepted: false,
        confidence: Confidence::Low,
        risk_score,
        reasons,
        benchmark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BenchResult, CandidateRejection, ConstraintId, ConstraintViolation, RiskLevel, StepResult,
    };

    fn step(name: &str, exit_code: i32) -> StepResult {
        StepResult {
            step: name.to_string(),
            command: name.to_string(),
            exit_code,
            duration_ms: 10,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    fn bench(value: f64) -> BenchResult {
        BenchResult {
            metric: "p50".to_string(),
            value,
            unit: Some("ms".to_string()),
            lower_is_better: true,
        }
    }

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".to_string(),
            kind: "memoization".to_string(),
            location: "src/app.ts:10".to_string(),
            rationale: String::new(),
            risk_level: RiskLevel::Low,
            risk_score: None,
        }
    }

    fn baseline(bench_value: Option<f64>) -> BaselineResult {
        BaselineResult::from_steps(
            vec![
                step("install", 0),
                step("build", 0),
                step("typecheck", 0),
                step("test", 0),
                step("bench", 0),
            ],
            bench_value.map(bench),
        )
    }

    fn candidate(steps: Vec<StepResult>, bench_value: Option<f64>) -> CandidateResult {
        CandidateResult::from_run("opp-1", BaselineResult::from_steps(steps, bench_value.map(bench)))
    }

    fn all_pass() -> Vec<StepResult> {
        vec![step("build", 0), step("typecheck", 0), step("test", 0), step("bench", 0)]
    }

    #[test]
    fn test_high_confidence_on_large_improvement() {
        let v = evaluate_acceptance(
            &baseline(Some(100.0)),
            &candidate(all_pass(), Some(80.0)),
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(v.accepted);
        assert_eq!(v.confidence, Confidence::High);
        assert!((v.risk_score - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_small_regression_within_tolerance_is_accepted() {
        let v = evaluate_acceptance(
            &baseline(Some(100.0)),
            &candidate(all_pass(), Some(101.5)),
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(v.accepted);
        assert_eq!(v.confidence, Confidence::Low);
    }

    #[test]
    fn test_regression_beyond_tolerance_rejected() {
        let v = evaluate_acceptance(
            &baseline(Some(100.0)),
            &candidate(all_pass(), Some(110.0)),
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(!v.accepted);
        assert_eq!(v.confidence, Confidence::Low);
        assert!(v.reasons.iter().any(|r| r.contains("regressed")));
    }

    #[test]
    fn test_broken_step_rejected() {
        let v = evaluate_acceptance(
            &baseline(None),
            &candidate(vec![step("build", 0), step("typecheck", 0), step("test", 1)], None),
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(!v.accepted);
        assert!(v.reasons.iter().any(|r| r.contains("test failed")));
        assert!(v.reasons.iter().any(|r| r.contains("bench was not reached")));
    }

    #[test]
    fn test_no_benchmark_with_tests_is_medium() {
        let v = evaluate_acceptance(
            &baseline(None),
            &candidate(all_pass(), None),
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(v.accepted);
        assert_eq!(v.confidence, Confidence::Medium);
    }

    #[test]
    fn test_short_circuited_candidate_rejected() {
        let violation = ConstraintViolation::new(ConstraintId::MaxLines, "202 lines changed");
        let result =
            CandidateResult::rejected("opp-1", CandidateRejection::Constraint { violation });
        let v = evaluate_acceptance(
            &baseline(Some(100.0)),
            &result,
            &opportunity(),
            &AcceptancePolicy::default(),
        );
        assert!(!v.accepted);
        assert_eq!(v.confidence, Confidence::Low);
        assert!(v.benchmark.is_none());
    }
}
