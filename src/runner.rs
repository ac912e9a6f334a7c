use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub log_path: PathBuf,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run the downstream attach command, capturing stdout and stderr into
/// `log_path` (truncated first). The child is killed once `timeout` elapses.
pub async fn run_attach(command: &[String], log_path: &Path, timeout: Duration) -> Result<RunOutcome> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("attach command is empty"))?;
    let run_id = Uuid::new_v4();

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create log dir: {}", parent.display()))?;
    }
    let stdout_log = tokio::fs::File::create(log_path)
        .await
        .with_context(|| format!("failed to open run log: {}", log_path.display()))?
        .into_std()
        .await;
    let stderr_log = stdout_log
        .try_clone()
        .context("failed to share run log with stderr")?;

    info!(%run_id, program = %program, ?args, log = %log_path.display(), "starting attach run");
    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_log))
        .stderr(Stdio::from(stderr_log))
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn attach command {}", program))?;

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.context("failed to wait for attach command")?;
            (status.code(), false)
        }
        Err(_) => {
            warn!(%run_id, timeout_secs = timeout.as_secs(), "attach run exceeded timeout; killing");
            if let Err(err) = child.kill().await {
                warn!(?err, %run_id, "failed to kill attach run");
            }
            (None, true)
        }
    };

    let outcome = RunOutcome {
        run_id,
        exit_code,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
        log_path: log_path.to_path_buf(),
    };
    info!(%run_id, ?exit_code, timed_out, elapsed_ms = outcome.elapsed_ms, "attach run finished");
    Ok(outcome)
}
