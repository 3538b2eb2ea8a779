//! Session lifecycle over one transport.
//!
//! ```text
//! Disconnected → Connecting → Initialized → SessionActive ⇄ Prompting
//!                                               ↓              ↓
//!                                          Disconnected ← Idle ⇄ Prompting
//! ```
//!
//! An [`AcpSession`] owns exactly one [`Transport`] and allows one prompt
//! in flight. While a prompt is outstanding the reader task feeds every
//! `session/update` for this session into the prompt's accumulator and
//! forwards the resulting [`AgentEvent`]s to the pool's event channel.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::acp::handshake;
use crate::acp::notifications::Demultiplexer;
use crate::acp::permission;
use crate::acp::reader::{InboundHandler, RpcError};
use crate::acp::transport::Transport;
use crate::events::{AgentEvent, ChannelEvent, EventSender};
use crate::{AppError, Result};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport, or the transport has gone away.
    Disconnected,
    /// Transport launched, `initialize` outstanding.
    Connecting,
    /// `initialize` succeeded; no session yet.
    Initialized,
    /// `session/new` succeeded; no prompt has run yet.
    SessionActive,
    /// A prompt is outstanding.
    Prompting,
    /// The last prompt finished.
    Idle,
}

impl SessionState {
    fn accepts_prompt(self) -> bool {
        matches!(self, Self::SessionActive | Self::Idle)
    }
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Channel this session serves; tags every emitted event.
    pub channel_key: String,
    /// Working directory sent as `cwd` in `session/new`.
    pub working_dir: PathBuf,
    /// Protocol version announced in `initialize`.
    pub protocol_version: u32,
    /// MCP server descriptors forwarded in `session/new`.
    pub mcp_servers: Vec<Value>,
    /// Pause after `session/new` before prompts are accepted.
    pub settle: Duration,
    /// Prompt deadline; `None` waits indefinitely.
    pub prompt_timeout: Option<Duration>,
}

/// Accumulated result of one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptReply {
    /// Concatenated message chunks.
    pub text: String,
    /// Concatenated reasoning chunks.
    pub thought: String,
    /// Stop reason reported by the agent.
    pub stop_reason: Option<String>,
    /// Number of tool calls that produced a result during the prompt.
    pub tool_calls: usize,
}

#[derive(Debug)]
struct Shared {
    state: SessionState,
    session_id: Option<String>,
    current_mode: Option<String>,
    accumulator: Option<PromptReply>,
    shutting_down: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inbound handler for one session; runs on the transport's reader task.
struct SessionHandler {
    channel_key: String,
    shared: Arc<Mutex<Shared>>,
    demux: Demultiplexer,
    events: EventSender,
}

impl SessionHandler {
    fn emit(&self, event: AgentEvent) {
        let tagged = ChannelEvent {
            channel_key: self.channel_key.clone(),
            event,
        };
        if self.events.send(tagged).is_err() {
            debug!(channel_key = %self.channel_key, "event receiver gone, event dropped");
        }
    }
}

impl InboundHandler for SessionHandler {
    fn on_notification(&mut self, method: &str, params: Value) {
        if method != "session/update" {
            debug!(channel_key = %self.channel_key, method, "ignoring notification");
            return;
        }

        {
            let shared = lock(&self.shared);
            let target = params.get("sessionId").and_then(Value::as_str);
            if let (Some(target), Some(ours)) = (target, shared.session_id.as_deref()) {
                if target != ours {
                    debug!(channel_key = %self.channel_key, session_id = target, "update for another session dropped");
                    return;
                }
            }
        }

        let Some(update) = params.get("update") else {
            return;
        };
        let events = self.demux.handle_update(update);

        {
            let mut shared = lock(&self.shared);
            for event in &events {
                match event {
                    AgentEvent::ModeChanged { mode } => shared.current_mode = Some(mode.clone()),
                    AgentEvent::TextChunk { text } => {
                        if let Some(acc) = shared.accumulator.as_mut() {
                            acc.text.push_str(text);
                        }
                    }
                    AgentEvent::ReasoningChunk { text } => {
                        if let Some(acc) = shared.accumulator.as_mut() {
                            acc.thought.push_str(text);
                        }
                    }
                    AgentEvent::ToolResult { .. } => {
                        if let Some(acc) = shared.accumulator.as_mut() {
                            acc.tool_calls += 1;
                        }
                    }
                    _ => {}
                }
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    fn on_request(&mut self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        if method != "session/request_permission" {
            warn!(channel_key = %self.channel_key, method, "unsupported agent request");
            return Err(RpcError::method_not_found(method));
        }
        let (reply, event) = permission::intercept(&params);
        self.emit(event);
        Ok(reply)
    }

    fn on_closed(&mut self, reason: &str) {
        let expected = {
            let mut shared = lock(&self.shared);
            shared.state = SessionState::Disconnected;
            shared.accumulator = None;
            shared.shutting_down
        };
        if !expected {
            warn!(channel_key = %self.channel_key, reason, "agent stream closed unexpectedly");
            self.emit(AgentEvent::SessionTerminated {
                reason: reason.to_owned(),
            });
        }
    }
}

/// One ACP conversation bound to one agent process.
#[derive(Debug)]
pub struct AcpSession {
    options: SessionOptions,
    shared: Arc<Mutex<Shared>>,
    transport: Mutex<Option<Arc<Transport>>>,
    events: EventSender,
}

impl AcpSession {
    /// Create a disconnected session.
    #[must_use]
    pub fn new(options: SessionOptions, events: EventSender) -> Self {
        Self {
            options,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Disconnected,
                session_id: None,
                current_mode: None,
                accumulator: None,
                shutting_down: false,
            })),
            transport: Mutex::new(None),
            events,
        }
    }

    /// Launch a transport with `open` and perform `initialize`.
    ///
    /// `open` receives the inbound handler that must be installed on the
    /// new transport's reader.
    ///
    /// # Errors
    ///
    /// - Whatever `open` returns, typically [`AppError::ProcessSpawn`].
    /// - [`AppError::Initialize`] if the agent rejects `initialize`.
    /// - [`AppError::NotConnected`] if the agent exits during the handshake.
    pub async fn connect<F>(&self, open: F) -> Result<handshake::AgentInfo>
    where
        F: FnOnce(Box<dyn InboundHandler>) -> Result<Transport>,
    {
        let span = info_span!("session_connect", channel_key = %self.options.channel_key);
        async move {
            {
                let mut shared = lock(&self.shared);
                if shared.state != SessionState::Disconnected {
                    return Err(AppError::Acp("session is already connected".into()));
                }
                shared.state = SessionState::Connecting;
                shared.shutting_down = false;
            }

            let handler = SessionHandler {
                channel_key: self.options.channel_key.clone(),
                shared: Arc::clone(&self.shared),
                demux: Demultiplexer::new(),
                events: self.events.clone(),
            };
            let transport = match open(Box::new(handler)) {
                Ok(transport) => Arc::new(transport),
                Err(err) => {
                    self.set_state(SessionState::Disconnected);
                    return Err(err);
                }
            };
            *self.transport_slot() = Some(Arc::clone(&transport));

            let outcome = transport
                .call(
                    "initialize",
                    handshake::initialize_params(self.options.protocol_version),
                )
                .await
                .and_then(|response| handshake::parse_initialize(&response));

            match outcome {
                Ok(info) => {
                    self.set_state(SessionState::Initialized);
                    info!(pid = ?transport.pid(), protocol_version = ?info.protocol_version, "agent initialized");
                    Ok(info)
                }
                Err(err) => {
                    self.disconnect().await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Open the conversation with `session/new`, then wait the settle
    /// period.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConnected`] if `connect` has not succeeded.
    /// - [`AppError::SessionCreate`] if the agent returns no session id.
    pub async fn create_session(&self) -> Result<handshake::NewSession> {
        let span = info_span!("session_create", channel_key = %self.options.channel_key);
        async move {
            let transport = self.transport_for(|state| state == SessionState::Initialized)?;

            let params =
                handshake::session_new_params(&self.options.working_dir, &self.options.mcp_servers);
            let session = transport
                .call("session/new", params)
                .await
                .and_then(|response| handshake::parse_session_new(&response))?;

            {
                let mut shared = lock(&self.shared);
                shared.session_id = Some(session.session_id.clone());
                shared.current_mode.clone_from(&session.current_mode);
                shared.state = SessionState::SessionActive;
            }
            info!(session_id = %session.session_id, mode = ?session.current_mode, "session created");

            if !self.options.settle.is_zero() {
                tokio::time::sleep(self.options.settle).await;
            }
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// Run one prompt to completion.
    ///
    /// # Errors
    ///
    /// - [`AppError::Busy`] if another prompt is in flight.
    /// - [`AppError::NotConnected`] if there is no live session or the
    ///   agent goes away mid-prompt.
    /// - [`AppError::Timeout`] if the prompt deadline expires; the agent is
    ///   sent `session/cancel`.
    /// - [`AppError::Acp`] if the agent answers with an error.
    pub async fn prompt(&self, text: &str) -> Result<PromptReply> {
        let session_id = {
            let mut shared = lock(&self.shared);
            if shared.state == SessionState::Prompting {
                return Err(AppError::Busy(format!(
                    "channel {} already has a prompt in flight",
                    self.options.channel_key
                )));
            }
            if !shared.state.accepts_prompt() {
                return Err(AppError::NotConnected(format!(
                    "channel {} has no active session",
                    self.options.channel_key
                )));
            }
            let Some(session_id) = shared.session_id.clone() else {
                return Err(AppError::NotConnected("no session id".into()));
            };
            shared.state = SessionState::Prompting;
            shared.accumulator = Some(PromptReply::default());
            session_id
        };

        let Some(transport) = self.transport_slot().clone() else {
            self.finish_prompt(SessionState::Disconnected);
            return Err(AppError::NotConnected("transport is gone".into()));
        };

        let span = info_span!("session_prompt", channel_key = %self.options.channel_key, %session_id);
        async move {
            debug!(chars = text.chars().count(), "prompt sent");
            let outcome = transport
                .call_with_deadline(
                    "session/prompt",
                    handshake::prompt_params(&session_id, text),
                    self.options.prompt_timeout,
                )
                .await;

            match outcome {
                Ok(response) => {
                    let mut reply = self.finish_prompt(SessionState::Idle).unwrap_or_default();
                    match handshake::parse_prompt(&response) {
                        Ok(stop_reason) => {
                            reply.stop_reason = stop_reason;
                            info!(stop_reason = ?reply.stop_reason, tool_calls = reply.tool_calls, "prompt finished");
                            Ok(reply)
                        }
                        Err(message) => Err(AppError::Acp(format!("prompt failed: {message}"))),
                    }
                }
                Err(err @ AppError::Timeout(_)) => {
                    self.finish_prompt(SessionState::Idle);
                    if let Err(cancel_err) = transport
                        .notify("session/cancel", handshake::cancel_params(&session_id))
                        .await
                    {
                        warn!(%cancel_err, "could not send session/cancel");
                    }
                    Err(err)
                }
                Err(err) => {
                    let next = if transport.is_closed() {
                        SessionState::Disconnected
                    } else {
                        SessionState::Idle
                    };
                    self.finish_prompt(next);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Tear down the transport. Idempotent.
    pub async fn disconnect(&self) {
        lock(&self.shared).shutting_down = true;
        let transport = self.transport_slot().take();
        if let Some(transport) = transport {
            transport.shutdown().await;
            info!(channel_key = %self.options.channel_key, "session disconnected");
        }
        let mut shared = lock(&self.shared);
        shared.state = SessionState::Disconnected;
        shared.accumulator = None;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    /// Agent-assigned session id, once created.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        lock(&self.shared).session_id.clone()
    }

    /// Mode last reported by the agent.
    #[must_use]
    pub fn current_mode(&self) -> Option<String> {
        lock(&self.shared).current_mode.clone()
    }

    /// Channel this session serves.
    #[must_use]
    pub fn channel_key(&self) -> &str {
        &self.options.channel_key
    }

    /// Working directory the session was opened in.
    #[must_use]
    pub fn working_dir(&self) -> &std::path::Path {
        &self.options.working_dir
    }

    /// Agent process id, when backed by a process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.transport_slot().as_ref().and_then(|t| t.pid())
    }

    fn transport_slot(&self) -> MutexGuard<'_, Option<Arc<Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        lock(&self.shared).state = state;
    }

    fn transport_for(&self, allowed: impl Fn(SessionState) -> bool) -> Result<Arc<Transport>> {
        let state = self.state();
        if !allowed(state) {
            return Err(AppError::NotConnected(format!(
                "channel {} is {state:?}",
                self.options.channel_key
            )));
        }
        self.transport_slot()
            .clone()
            .ok_or_else(|| AppError::NotConnected("transport is gone".into()))
    }

    fn finish_prompt(&self, next: SessionState) -> Option<PromptReply> {
        let mut shared = lock(&self.shared);
        if shared.state == SessionState::Prompting {
            shared.state = next;
        }
        shared.accumulator.take()
    }
}
