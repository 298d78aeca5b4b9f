//! External `patch` tool wrapper.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::error::{PatchApplyError, PatchOperation, PatchResultOf};

/// Configuration for the external patch tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatchToolConfig {
    /// Binary name or path.
    pub binary: String,
    /// Path components stripped from diff headers (`-pN`).
    pub strip: u32,
    /// Context lines that may be ignored when locating a hunk.
    pub fuzz: u32,
    /// Timeout for a single tool invocation.
    pub timeout_secs: u64,
}

impl Default for PatchToolConfig {
    fn default() -> Self {
        Self {
            binary: "patch".to_string(),
            strip: 1,
            fuzz: 3,
            timeout_secs: 60,
        }
    }
}

/// Applies and reverts unified diffs against a checked-out tree.
#[async_trait]
pub trait PatchApplicator: Send + Sync {
    async fn apply_diff(&self, repo_dir: &Path, diff: &str) -> PatchResultOf<()>;

    async fn revert_diff(&self, repo_dir: &Path, diff: &str) -> PatchResultOf<()>;
}

/// [`PatchApplicator`] backed by the host's `patch` binary.
///
/// Obtain one through [`PatchTool::probe`], which fails when the tool is
/// missing; a missing tool is fatal for the whole run.
#[derive(Debug, Clone)]
pub struct PatchTool {
    config: PatchToolConfig,
}

impl PatchTool {
    /// Check that the tool is runnable and return a handle to it.
    pub async fn probe(config: PatchToolConfig) -> PatchResultOf<Self> {
        let output = Command::new(&config.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PatchApplyError::ToolMissing {
                tool: config.binary.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PatchApplyError::ToolMissing {
                tool: config.binary.clone(),
                reason: format!(
                    "'{} --version' exited with {}",
                    config.binary,
                    output.status.code().unwrap_or(-1)
                ),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            tool = %config.binary,
            version = %version.lines().next().unwrap_or("").trim(),
            "patch tool available"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &PatchToolConfig {
        &self.config
    }

    fn base_args(&self, operation: PatchOperation, dry_run: bool) -> Vec<String> {
        let mut args = vec![
            format!("-p{}", self.config.strip),
            "--batch".to_string(),
            // --batch alone silently flips patches that look reversed.
            "--forward".to_string(),
            "--silent".to_string(),
            format!("--fuzz={}", self.config.fuzz),
            "--no-backup-if-mismatch".to_string(),
            "--reject-file=-".to_string(),
        ];
        if operation == PatchOperation::Revert {
            args.push("-R".to_string());
        }
        if dry_run {
            args.push("--dry-run".to_string());
        }
        args
    }

    async fn invoke(
        &self,
        repo_dir: &Path,
        diff: &str,
        operation: PatchOperation,
        dry_run: bool,
    ) -> PatchResultOf<()> {
        let args = self.base_args(operation, dry_run);
        debug!(tool = %self.config.binary, ?args, dir = %repo_dir.display(), "invoking patch tool");

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .current_dir(repo_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(diff.as_bytes()).await?;
            if !diff.ends_with('\n') {
                stdin.write_all(b"\n").await?;
            }
            stdin.shutdown().await?;
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| PatchApplyError::Timeout {
            operation,
            timeout_secs: self.config.timeout_secs,
        })??;

        if output.status.success() {
            return Ok(());
        }

        Err(PatchApplyError::Failed {
            operation,
            dry_run,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Dry run first so a diff with a failing hunk never half-applies.
    async fn run(&self, repo_dir: &Path, diff: &str, operation: PatchOperation) -> PatchResultOf<()> {
        if diff.trim().is_empty() {
            return Err(PatchApplyError::EmptyDiff { operation });
        }
        self.invoke(repo_dir, diff, operation, true).await?;
        self.invoke(repo_dir, diff, operation, false).await
    }
}

#[async_trait]
impl PatchApplicator for PatchTool {
    async fn apply_diff(&self, repo_dir: &Path, diff: &str) -> PatchResultOf<()> {
        self.run(repo_dir, diff, PatchOperation::Apply).await
    }

    async fn revert_diff(&self, repo_dir: &Path, diff: &str) -> PatchResultOf<()> {
        self.run(repo_dir, diff, PatchOperation::Revert).await
    }
}
