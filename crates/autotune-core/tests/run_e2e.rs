//! Whole-run orchestration with in-memory executor and applicator.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use autotune_core::patch::PatchResultOf;
use autotune_core::{
    read_run_report, write_run_report, AdapterRegistry, BaselineResult, BenchResult, Candidate,
    Confidence, DetectionResult, EngineConfig, ExecutionAttemptPlan, Language, OptimizationRun,
    Opportunity, PatchApplicator, PatchResult, PipelineExecutor, PipelineStep, RiskLevel,
    StepResult, StrategySettings,
};

/// The diff currently applied to the pretend working tree.
type Tree = Arc<Mutex<Option<String>>>;

struct TreeApplicator {
    tree: Tree,
}

#[async_trait]
impl PatchApplicator for TreeApplicator {
    async fn apply_diff(&self, _repo_dir: &Path, diff: &str) -> PatchResultOf<()> {
        *self.tree.lock().unwrap() = Some(diff.to_string());
        Ok(())
    }

    async fn revert_diff(&self, _repo_dir: &Path, _diff: &str) -> PatchResultOf<()> {
        *self.tree.lock().unwrap() = None;
        Ok(())
    }
}

/// Bench latency depends on which diff is applied: 100ms unpatched, 80ms for
/// a "fast" diff, 130ms for a "slow" one.
struct TreeExecutor {
    tree: Tree,
}

#[async_trait]
impl PipelineExecutor for TreeExecutor {
    async fn run_steps(
        &self,
        _repo_dir: &Path,
        plan: &ExecutionAttemptPlan,
        steps: &[PipelineStep],
        _cancel: &CancellationToken,
    ) -> BaselineResult {
        let latency = match self.tree.lock().unwrap().as_deref() {
            Some(diff) if diff.contains("fast") => 80.0,
            Some(diff) if diff.contains("slow") => 130.0,
            _ => 100.0,
        };
        let results = plan
            .runnable(steps)
            .into_iter()
            .map(|step| StepResult {
                step: step.name().to_string(),
                command: plan.command(step).unwrap_or_default().to_string(),
                exit_code: 0,
                duration_ms: 2,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            })
            .collect();
        let bench = BenchResult {
            metric: "p50".to_string(),
            value: latency,
            unit: Some("ms".to_string()),
            lower_is_better: true,
        };
        BaselineResult::from_steps(results, Some(bench))
    }
}

fn detection() -> DetectionResult {
    DetectionResult {
        language: Language::Go,
        install_cmd: Some("go mod download".to_string()),
        build_cmd: Some("go build ./...".to_string()),
        typecheck_cmd: Some("go vet ./...".to_string()),
        test_cmd: Some("go test ./...".to_string()),
        bench_cmd: Some("go test -bench=. ./...".to_string()),
        ..DetectionResult::default()
    }
}

fn candidate(id: &str, file: &str, marker: &str) -> Candidate {
    Candidate {
        opportunity: Opportunity {
            id: id.to_string(),
            kind: "allocation".to_string(),
            location: format!("{file}:1"),
            rationale: String::new(),
            risk_level: RiskLevel::Medium,
            risk_score: None,
        },
        patch: PatchResult::from_diff(format!(
            "--- a/{file}\n+++ b/{file}\n@@ -1 +1 @@\n-old\n+{marker}\n"
        )),
    }
}

fn run(tree: &Tree) -> OptimizationRun {
    OptimizationRun::new(EngineConfig::default(), Arc::new(AdapterRegistry::standard()))
        .with_executor(Arc::new(TreeExecutor { tree: tree.clone() }))
        .with_applicator(Arc::new(TreeApplicator { tree: tree.clone() }))
}

#[tokio::test]
async fn test_run_judges_every_candidate_and_persists_report() {
    let tree: Tree = Arc::default();
    let candidates = vec![
        candidate("fast", "pkg/cache.go", "fast"),
        candidate("slow", "pkg/cache.go", "slow"),
        candidate("manifest", "go.mod", "fast"),
    ];

    let report = run(&tree)
        .execute(
            Path::new("."),
            &detection(),
            &StrategySettings::adaptive(3),
            &candidates,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.strategy.is_success());
    assert_eq!(report.evaluations.len(), 3);
    assert!(report.skipped.is_empty());
    assert!(!report.tree_dirty);
    assert!(tree.lock().unwrap().is_none());

    let fast = &report.evaluations[0];
    assert!(fast.verdict.accepted);
    assert_eq!(fast.verdict.confidence, Confidence::High);
    assert!((fast.verdict.risk_score - 0.5).abs() < f32::EPSILON);

    let slow = &report.evaluations[1];
    assert!(!slow.verdict.accepted);
    assert!(slow.verdict.reasons.iter().any(|r| r.contains("regressed")));

    let manifest = &report.evaluations[2];
    assert!(!manifest.verdict.accepted);
    assert!(manifest.result.rejection.is_some());

    assert_eq!(
        report.accepted().map(|e| e.candidate_id.as_str()).collect::<Vec<_>>(),
        vec!["fast"]
    );

    let dir = tempfile::tempdir().unwrap();
    write_run_report(&report, dir.path()).unwrap();
    let restored = read_run_report(&report.run_id, dir.path()).unwrap();
    assert_eq!(restored.run_id, report.run_id);
    assert_eq!(restored.strategy.plans, report.strategy.plans);
    assert_eq!(
        restored.evaluations.iter().map(|e| e.verdict.accepted).collect::<Vec<_>>(),
        vec![true, false, false]
    );
}

#[tokio::test]
async fn test_cancelled_run_skips_remaining_candidates() {
    let tree: Tree = Arc::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run(&tree)
        .execute(
            Path::new("."),
            &detection(),
            &StrategySettings::strict(),
            &[candidate("a", "pkg/a.go", "fast"), candidate("b", "pkg/b.go", "fast")],
            &cancel,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.evaluations.is_empty());
    assert_eq!(report.skipped, vec!["a", "b"]);
}
