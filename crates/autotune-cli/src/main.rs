//! Autotune CLI
//!
//! The `autotune` command establishes baselines and validates candidate
//! patches against a checked-out repository.
//!
//! ## Commands
//!
//! - `probe`: Check that the host patch tool is available
//! - `baseline`: Establish a baseline and print the strategy outcome
//! - `check`: Run the constraint gate on a patch
//! - `run`: Baseline plus validation of every candidate
//! - `report`: Print a persisted run report after verifying its digest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use autotune_core::{
    enforce_constraints, read_run_report, write_run_report, AdapterRegistry, Candidate,
    DetectionResult, EngineConfig, ExecutionStrategyEngine, OptimizationRun, PatchResult,
    PatchTool, SandboxExecutor, StrategyMode, StrategySettings,
};

#[derive(Parser)]
#[command(name = "autotune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Execution strategy and sandboxed validation engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "AUTOTUNE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct StrategyArgs {
    /// Strategy mode: strict or adaptive
    #[arg(long, env = "AUTOTUNE_MODE", default_value = "adaptive")]
    mode: StrategyMode,

    /// Attempt budget in adaptive mode (clamped to 1..=3)
    #[arg(long, env = "AUTOTUNE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,
}

impl StrategyArgs {
    fn settings(&self) -> StrategySettings {
        StrategySettings::new(self.mode, self.max_attempts)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the patch tool is installed and runnable
    Probe,

    /// Establish a baseline for a repository
    Baseline {
        /// Checked-out repository
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Detection result (JSON)
        #[arg(long)]
        detection: PathBuf,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Run the constraint gate on a patch
    Check {
        /// PatchResult JSON, or a raw unified diff
        #[arg(long)]
        patch: PathBuf,
    },

    /// Establish a baseline, then validate and judge every candidate
    Run {
        /// Checked-out repository
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Detection result (JSON)
        #[arg(long)]
        detection: PathBuf,

        /// Candidate list (JSON array)
        #[arg(long)]
        candidates: PathBuf,

        #[command(flatten)]
        strategy: StrategyArgs,

        /// Persist the run report under this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Print a persisted run report after verifying its digest
    Report {
        /// Run ID
        run_id: String,

        /// Directory the report was written to
        #[arg(long, default_value = ".autotune/runs")]
        report_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    autotune_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Probe => cmd_probe(&config).await,
        Commands::Baseline {
            repo,
            detection,
            strategy,
        } => cmd_baseline(&config, &repo, &detection, &strategy.settings()).await,
        Commands::Check { patch } => cmd_check(&config, &patch),
        Commands::Run {
            repo,
            detection,
            candidates,
            strategy,
            report_dir,
        } => {
            cmd_run(
                config,
                &repo,
                &detection,
                &candidates,
                &strategy.settings(),
                report_dir.as_deref(),
            )
            .await
        }
        Commands::Report { run_id, report_dir } => cmd_report(&run_id, &report_dir),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {what} from {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Invalid {what} JSON in {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancellation token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next step boundary");
            child.cancel();
        }
    });
    token
}

async fn cmd_probe(config: &EngineConfig) -> Result<()> {
    PatchTool::probe(config.patch.clone())
        .await
        .context("Patch tool probe failed")?;
    println!("patch tool '{}' is available", config.patch.binary);
    Ok(())
}

async fn cmd_baseline(
    config: &EngineConfig,
    repo: &Path,
    detection: &Path,
    settings: &StrategySettings,
) -> Result<()> {
    let detection: DetectionResult = read_json(detection, "detection result")?;
    let executor = Arc::new(SandboxExecutor::from_config(config));
    let engine = ExecutionStrategyEngine::new(executor, Arc::new(AdapterRegistry::standard()))
        .with_excerpt_bytes(config.excerpt_bytes);

    let cancel = cancel_on_ctrl_c();
    let outcome = engine
        .establish_baseline(repo, &detection, settings, &cancel)
        .await;
    print_json(&outcome)?;

    if !outcome.is_success() {
        anyhow::bail!(
            "Baseline failed after {} attempt(s): {}",
            outcome.attempts(),
            outcome.baseline.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn cmd_check(config: &EngineConfig, patch: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(patch)
        .with_context(|| format!("Failed to read patch from {:?}", patch))?;
    let patch = if raw.trim_start().starts_with('{') {
        serde_json::from_str::<PatchResult>(&raw)
            .with_context(|| format!("Invalid patch JSON in {:?}", patch))?
    } else {
        PatchResult::from_diff(raw)
    };

    let files = patch.effective_touched_files();
    let verdict = match enforce_constraints(&patch, &config.constraints) {
        Ok(()) => serde_json::json!({
            "ok": true,
            "touched_files": files,
            "lines_changed": autotune_core::count_diff_lines(&patch.diff),
        }),
        Err(violation) => serde_json::json!({
            "ok": false,
            "touched_files": files,
            "violation": violation,
        }),
    };
    print_json(&verdict)?;

    if verdict["ok"] == false {
        anyhow::bail!("Patch rejected by the constraint gate");
    }
    Ok(())
}

async fn cmd_run(
    config: EngineConfig,
    repo: &Path,
    detection: &Path,
    candidates: &Path,
    settings: &StrategySettings,
    report_dir: Option<&Path>,
) -> Result<()> {
    let detection: DetectionResult = read_json(detection, "detection result")?;
    let candidates: Vec<Candidate> = read_json(candidates, "candidate list")?;

    let run = OptimizationRun::new(config, Arc::new(AdapterRegistry::standard()));
    let cancel = cancel_on_ctrl_c();
    let report = run
        .execute(repo, &detection, settings, &candidates, &cancel)
        .await
        .context("Optimization run failed")?;

    if let Some(dir) = report_dir {
        let path = write_run_report(&report, dir)
            .with_context(|| format!("Failed to write run report under {:?}", dir))?;
        info!(path = %path.display(), "run report written");
    }
    print_json(&report)?;
    Ok(())
}

fn cmd_report(run_id: &str, report_dir: &Path) -> Result<()> {
    let report = read_run_report(run_id, report_dir)
        .with_context(|| format!("Failed to read run report {run_id}"))?;
    print_json(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "autotune",
            "--json",
            "run",
            "--repo",
            "/tmp/repo",
            "--detection",
            "det.json",
            "--candidates",
            "cands.json",
            "--mode",
            "strict",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { strategy, .. } => {
                assert_eq!(strategy.mode, StrategyMode::Strict);
                assert_eq!(strategy.settings().effective_attempts(), 1);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_max_attempts_clamped() {
        let cli = Cli::try_parse_from([
            "autotune",
            "baseline",
            "--detection",
            "det.json",
            "--max-attempts",
            "9",
        ])
        .unwrap();
        match cli.command {
            Commands::Baseline { strategy, .. } => {
                assert_eq!(strategy.settings().max_attempts(), 3);
            }
            _ => panic!("expected baseline command"),
        }
    }

    #[test]
    fn test_check_rejects_manifest_diff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("change.diff");
        std::fs::write(
            &path,
            "--- a/package.json\n+++ b/package.json\n@@ -1 +1 @@\n-a\n+b\n",
        )
        .unwrap();
        assert!(cmd_check(&EngineConfig::default(), &path).is_err());
    }
}
