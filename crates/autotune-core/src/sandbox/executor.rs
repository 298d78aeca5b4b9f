//! Sandboxed step execution and the fail-fast pipeline runner.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::limits::ResourceLimits;
use crate::bench::extract_bench;
use crate::config::{EngineConfig, StepTimeouts};
use crate::domain::{
    BaselineResult, ExecutionAttemptPlan, PipelineStep, StepResult, EXIT_SENTINEL,
};
use crate::obs;

/// How long to wait for output pipes to drain after the child exits.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Runs pipeline steps for a plan against a checked-out tree.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// Run the plan's commands for `steps`, in the given order, fail-fast.
    ///
    /// Steps without a command in the plan are skipped. Cancellation is
    /// checked before every step.
    async fn run_steps(
        &self,
        repo_dir: &Path,
        plan: &ExecutionAttemptPlan,
        steps: &[PipelineStep],
        cancel: &CancellationToken,
    ) -> BaselineResult;

    /// Run the full pipeline: install, build, typecheck, test, bench.
    async fn run_baseline(
        &self,
        repo_dir: &Path,
        plan: &ExecutionAttemptPlan,
        cancel: &CancellationToken,
    ) -> BaselineResult {
        self.run_steps(repo_dir, plan, &PipelineStep::ALL, cancel)
            .await
    }
}

/// [`PipelineExecutor`] that runs each step as an isolated host subprocess.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    timeouts: StepTimeouts,
    limits: ResourceLimits,
}

impl SandboxExecutor {
    pub fn new(timeouts: StepTimeouts, limits: ResourceLimits) -> Self {
        Self { timeouts, limits }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.timeouts.clone(), config.limits.clone())
    }
}

#[async_trait]
impl PipelineExecutor for SandboxExecutor {
    async fn run_steps(
        &self,
        repo_dir: &Path,
        plan: &ExecutionAttemptPlan,
        steps: &[PipelineStep],
        cancel: &CancellationToken,
    ) -> BaselineResult {
        let runnable = plan.runnable(steps);
        if runnable.is_empty() {
            return BaselineResult::interrupted(Vec::new(), "no runnable pipeline steps in plan");
        }

        let mut results: Vec<StepResult> = Vec::with_capacity(runnable.len());
        for step in runnable {
            if cancel.is_cancelled() {
                return BaselineResult::interrupted(results, format!("cancelled before {step}"));
            }
            let Some(command) = plan.command(step) else {
                continue;
            };

            let result = run_step(
                step.name(),
                command,
                repo_dir,
                self.timeouts.for_step(step),
                plan.env_for(step),
                &self.limits,
            )
            .await;
            obs::emit_step_finished(plan.attempt, &result);

            let failed = !result.is_success();
            results.push(result);
            if failed {
                break;
            }
        }

        let bench = results
            .last()
            .filter(|r| r.is_success() && r.pipeline_step() == Some(PipelineStep::Bench))
            .map(extract_bench);
        BaselineResult::from_steps(results, bench)
    }
}

/// Run one shell command as an isolated child process.
///
/// Never fails: spawn errors and timeouts are reported through the returned
/// [`StepResult`] with exit code [`EXIT_SENTINEL`].
pub async fn run_step(
    name: &str,
    command: &str,
    cwd: &Path,
    timeout: Duration,
    env: Option<&BTreeMap<String, String>>,
    limits: &ResourceLimits,
) -> StepResult {
    let start = Instant::now();
    debug!(step = %name, command = %command, cwd = %cwd.display(), "running step");

    let mut cmd = shell_command(command);
    cmd.current_dir(cwd)
        .env("CI", "true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(env) = env {
        cmd.envs(env);
    }
    #[cfg(unix)]
    cmd.process_group(0);
    limits.install(&mut cmd);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(step = %name, error = %e, "failed to spawn step");
            return StepResult {
                step: name.to_string(),
                command: command.to_string(),
                exit_code: EXIT_SENTINEL,
                duration_ms: start.elapsed().as_millis() as u64,
                stdout: String::new(),
                stderr: format!("failed to spawn '{command}': {e}"),
                timed_out: false,
            };
        }
    };

    let pid = child.id();
    let stdout_capture = spawn_reader(child.stdout.take());
    let stderr_capture = spawn_reader(child.stderr.take());

    let mut timed_out = false;
    let mut note: Option<String> = None;
    let exit_code = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => exit_code_of(status, &mut note),
        Ok(Err(e)) => {
            note = Some(format!("failed waiting for process: {e}"));
            EXIT_SENTINEL
        }
        Err(_) => {
            timed_out = true;
            kill_process_group(pid);
            if let Err(e) = child.start_kill() {
                debug!(step = %name, error = %e, "child already gone at timeout");
            }
            let _ = child.wait().await;
            note = Some(format!("step '{name}' timed out after {}s", timeout.as_secs()));
            EXIT_SENTINEL
        }
    };

    // Background processes the step left behind would hold the pipes open and
    // leak into the next run on the same tree.
    if !timed_out && kill_process_group(pid) {
        debug!(step = %name, "killed processes left running by step");
    }

    let stdout = collect(stdout_capture).await;
    let mut stderr = collect(stderr_capture).await;
    if let Some(note) = note {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&note);
    }

    StepResult {
        step: name.to_string(),
        command: command.to_string(),
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
        stdout,
        stderr,
        timed_out,
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Signal deaths map to `128 + signal`, the shell convention.
fn exit_code_of(status: std::process::ExitStatus, note: &mut Option<String>) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            *note = Some(format!("process killed by signal {signal}"));
            return 128 + signal;
        }
    }
    *note = Some("process exited without a status code".to_string());
    EXIT_SENTINEL
}

/// Output captured so far, readable even if the reader task is aborted.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn spawn_reader<R>(reader: Option<R>) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let task = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });
    Capture { buf, task }
}

async fn collect(mut capture: Capture) -> String {
    if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut capture.task)
        .await
        .is_err()
    {
        // Something outside the process group still holds the pipe open.
        capture.task.abort();
    }
    let bytes = std::mem::take(
        &mut *capture
            .buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );
    String::from_utf8_lossy(&bytes).into_owned()
}

/// SIGKILL the step's process group. Returns whether any member was signalled.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    let Ok(pgid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) with a negative pid signals the process group created for
    // this child via `process_group(0)`; it touches no memory.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    rc == 0
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_limits() -> ResourceLimits {
        ResourceLimits::disabled()
    }

    #[tokio::test]
    async fn test_run_step_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_step(
            "build",
            "echo hello",
            dir.path(),
            Duration::from_secs(10),
            None,
            &no_limits(),
        )
        .await;
        assert!(result.is_success());
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_run_step_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_step(
            "test",
            "echo broken >&2; exit 3",
            dir.path(),
            Duration::from_secs(10),
            None,
            &no_limits(),
        )
        .await;
        assert!(!result.is_success());
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("broken"));
    }

    #[tokio::test]
    async fn test_run_step_spawn_failure_is_sentinel() {
        let result = run_step(
            "install",
            "true",
            Path::new("/nonexistent/autotune/dir"),
            Duration::from_secs(10),
            None,
            &no_limits(),
        )
        .await;
        assert_eq!(result.exit_code, EXIT_SENTINEL);
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[test]
    fn test_exit_code_of_plain_exit() {
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 4"])
            .status()
            .unwrap();
        let mut note = None;
        assert_eq!(exit_code_of(status, &mut note), 4);
        assert!(note.is_none());
    }
}
