//! Transport and call correlator for one agent process.
//!
//! A [`Transport`] owns the reader, writer and (for real processes) the
//! exit-monitor and stderr tasks of a single agent. Calls are numbered from
//! 1 upwards, registered in [`PendingCalls`] and written through the writer
//! task; the reader resolves them by id in whatever order the responses
//! arrive.
//!
//! Pending calls never outlive the agent: EOF on stdout, a failed write,
//! process exit and [`Transport::shutdown`] all reject every outstanding call with
//! [`AppError::NotConnected`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::correlator::PendingCalls;
use crate::acp::reader::{run_reader, InboundHandler};
use crate::acp::spawner::{drain_stderr, monitor_exit, spawn_agent, AgentProcess, SpawnConfig};
use crate::acp::writer::run_writer;
use crate::{AppError, Result};

/// Outbound queue depth per agent.
const OUTBOUND_CAPACITY: usize = 64;

/// Upper bound on how long [`Transport::shutdown`] waits for its tasks.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Stdio connection to one agent plus the table of its outstanding calls.
#[derive(Debug)]
pub struct Transport {
    label: String,
    outbound: mpsc::Sender<Value>,
    pending: PendingCalls,
    next_id: AtomicU64,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    pid: Option<u32>,
}

impl Transport {
    /// Spawn the agent described by `config` and attach a transport to it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessSpawn`] if the agent cannot be launched.
    pub fn start(
        label: impl Into<String>,
        config: &SpawnConfig,
        handler: Box<dyn InboundHandler>,
    ) -> Result<Self> {
        let process = spawn_agent(config)?;
        Ok(Self::from_process(label, process, handler))
    }

    /// Attach a transport to an already spawned agent.
    #[must_use]
    pub fn from_process(
        label: impl Into<String>,
        process: AgentProcess,
        handler: Box<dyn InboundHandler>,
    ) -> Self {
        let AgentProcess {
            child,
            stdin,
            stdout,
            stderr,
        } = process;
        let pid = child.id();

        let mut transport = Self::from_streams(label, stdout, stdin, handler);
        transport.pid = pid;

        let mut extra = vec![monitor_exit(
            transport.label.clone(),
            child,
            transport.pending.clone(),
            transport.cancel.clone(),
        )];
        if let Some(stderr) = stderr {
            extra.push(drain_stderr(transport.label.clone(), stderr));
        }
        transport.tasks.get_mut().extend(extra);
        transport
    }

    /// Build a transport over an arbitrary byte stream pair.
    ///
    /// `reader` carries agent → client lines, `writer` client → agent
    /// lines. Must be called inside a tokio runtime.
    #[must_use]
    pub fn from_streams<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
        handler: Box<dyn InboundHandler>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let label = label.into();
        let pending = PendingCalls::new();
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let writer_task = {
            let label = label.clone();
            let cancel = cancel.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                if let Err(err) = run_writer(label.clone(), writer, outbound_rx, cancel.clone()).await {
                    warn!(channel_key = %label, %err, "acp writer stopped with error");
                    pending.close(&format!("agent stdin closed: {err}")).await;
                    cancel.cancel();
                }
            })
        };

        let reader_task = tokio::spawn(run_reader(
            label.clone(),
            reader,
            handler,
            pending.clone(),
            outbound.clone(),
            cancel.clone(),
        ));

        Self {
            label,
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            cancel,
            tasks: Mutex::new(vec![writer_task, reader_task]),
            pid: None,
        }
    }

    /// Issue `method` and wait for its response with no deadline.
    ///
    /// Resolves with the raw response object; application-level failures
    /// are left in its `error` member for the caller to inspect.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] if the transport is closed before
    /// or while the call is outstanding.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_with_deadline(method, params, None).await
    }

    /// Issue `method` and wait at most `deadline` for its response.
    ///
    /// On expiry the call's id is freed; a late response is then ignored.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConnected`] if the transport is or becomes closed.
    /// - [`AppError::Timeout`] if the deadline expires.
    pub async fn call_with_deadline(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        if self.cancel.is_cancelled() {
            return Err(self.closed_error(method).await);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.pending.register(id).await?;

        let msg = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if self.outbound.send(msg).await.is_err() {
            self.pending.cancel(id).await;
            return Err(self.closed_error(method).await);
        }
        debug!(channel_key = %self.label, call_id = id, method, "acp call sent");

        let received = match deadline {
            None => rx.await,
            Some(limit) => {
                if let Ok(received) = tokio::time::timeout(limit, rx).await {
                    received
                } else {
                    self.pending.cancel(id).await;
                    warn!(channel_key = %self.label, call_id = id, method, ?limit, "acp call timed out");
                    return Err(AppError::Timeout(format!(
                        "{method} (call {id}) got no response within {limit:?}"
                    )));
                }
            }
        };

        match received {
            Ok(response) => Ok(response),
            Err(_) => Err(self.closed_error(method).await),
        }
    }

    /// Send a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] if the writer has stopped.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let msg = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        if self.outbound.send(msg).await.is_err() {
            return Err(self.closed_error(method).await);
        }
        Ok(())
    }

    /// Stop the agent and reject everything still outstanding.
    ///
    /// Idempotent. Waits a bounded time for the background tasks, which
    /// includes the terminate-then-kill sequence for a real process.
    pub async fn shutdown(&self) {
        let rejected = self.pending.close("transport shut down").await;
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_WAIT, task).await.is_err() {
                warn!(channel_key = %self.label, "transport task did not stop in time");
            }
        }
        debug!(channel_key = %self.label, rejected, "transport shut down");
    }

    /// Whether the transport has stopped accepting calls.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// OS process id of the agent, when backed by a process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Label used in logs, normally the channel key.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of calls awaiting a response.
    pub async fn pending_calls(&self) -> usize {
        self.pending.len().await
    }

    async fn closed_error(&self, method: &str) -> AppError {
        let reason = self
            .pending
            .close_reason()
            .await
            .unwrap_or_else(|| "transport closed".to_owned());
        AppError::NotConnected(format!("{method}: {reason}"))
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Split a raw response into its `result`, or the message of its `error`.
///
/// # Errors
///
/// Returns the error's `message` (or the whole error object rendered as
/// JSON when it has none) if the response carries an `error` member.
pub fn response_result(response: &Value) -> std::result::Result<&Value, String> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_owned);
        return Err(message);
    }
    Ok(response.get("result").unwrap_or(&Value::Null))
}
