//! Agent process spawner.
//!
//! Launches the agent executable for one channel with:
//! - piped stdin/stdout for the protocol and piped stderr drained into
//!   tracing at `DEBUG`,
//! - `env_clear()` plus an allowlist, so the connector's own secrets are not
//!   inherited unless explicitly passed through,
//! - `kill_on_drop(true)` as the last line of cleanup.
//!
//! [`monitor_exit`] owns the [`Child`] afterwards: it closes the transport's
//! pending calls when the process dies on its own, and performs the
//! SIGTERM-then-kill sequence when the transport is shut down.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::correlator::PendingCalls;
use crate::{AppError, Result};

/// Environment variables always inherited by the agent process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "TERM",
    "SHELL",
    "TMPDIR",
    "RUST_LOG",
    "XDG_CONFIG_HOME",
    "XDG_CACHE_HOME",
    "XDG_DATA_HOME",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Time the agent gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// How to launch one agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent executable.
    pub agent_cli: String,
    /// Arguments, typically the single protocol-mode flag.
    pub agent_cli_args: Vec<String>,
    /// Working directory; the channel's isolated directory.
    pub working_dir: PathBuf,
    /// Additional variables to inherit beyond [`ALLOWED_ENV_VARS`].
    pub env_passthrough: Vec<String>,
}

/// A freshly spawned agent with its stdio captured.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle; hand it to [`monitor_exit`].
    pub child: Child,
    /// Agent's stdin.
    pub stdin: ChildStdin,
    /// Agent's stdout.
    pub stdout: ChildStdout,
    /// Agent's stderr, if captured.
    pub stderr: Option<ChildStderr>,
}

/// Spawn the agent process described by `config`.
///
/// # Errors
///
/// Returns [`AppError::ProcessSpawn`] if the executable cannot be found or
/// launched, or if its stdio could not be captured.
pub fn spawn_agent(config: &SpawnConfig) -> Result<AgentProcess> {
    let mut cmd = Command::new(&config.agent_cli);
    cmd.args(&config.agent_cli_args);

    cmd.env_clear();
    let inherited = ALLOWED_ENV_VARS
        .iter()
        .copied()
        .chain(config.env_passthrough.iter().map(String::as_str));
    for key in inherited {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&config.working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::ProcessSpawn(format!("failed to spawn `{}`: {err}", config.agent_cli))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::ProcessSpawn("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::ProcessSpawn("failed to capture agent stdout".into()))?;
    let stderr = child.stderr.take();

    info!(
        agent = %config.agent_cli,
        pid = child.id(),
        cwd = %config.working_dir.display(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Forward each stderr line of the agent into tracing.
#[must_use]
pub fn drain_stderr(label: String, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(channel_key = %label, stderr = %line, "agent stderr"),
                Ok(None) => break,
                Err(err) => {
                    debug!(channel_key = %label, %err, "agent stderr read failed");
                    break;
                }
            }
        }
    })
}

/// Own `child` until it exits or `cancel` fires.
///
/// On an unprompted exit the pending calls are closed so no caller waits on
/// a dead process. On cancellation the process is asked to terminate and
/// killed if it is still alive after a grace period.
#[must_use]
pub fn monitor_exit(
    label: String,
    mut child: Child,
    pending: PendingCalls,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = match result {
                    Ok(status) => status.code().map_or_else(
                        || "agent process terminated by signal".to_owned(),
                        |c| format!("agent process exited with code {c}"),
                    ),
                    Err(err) => {
                        warn!(channel_key = %label, %err, "error waiting for agent process");
                        format!("agent process wait error: {err}")
                    }
                };
                let rejected = pending.close(&reason).await;
                info!(channel_key = %label, %reason, rejected, "agent process exited");
                cancel.cancel();
            }
            () = cancel.cancelled() => {
                terminate(&label, &mut child).await;
            }
        }
    })
}

async fn terminate(label: &str, child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(raw) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                debug!(channel_key = %label, %err, "SIGTERM delivery failed");
            }
        }
    }

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            info!(channel_key = %label, ?status, "agent process stopped");
        }
        Ok(Err(err)) => {
            warn!(channel_key = %label, %err, "error waiting for agent process");
        }
        Err(_) => {
            warn!(
                channel_key = %label,
                "agent did not exit within grace period, killing"
            );
            if let Err(err) = child.kill().await {
                warn!(channel_key = %label, %err, "failed to kill agent process");
            }
        }
    }
}
