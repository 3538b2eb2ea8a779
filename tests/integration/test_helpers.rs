//! Shared helpers for protocol-level integration tests.
//!
//! [`FakeAgent`] speaks just enough ACP over an in-memory duplex pipe to
//! drive sessions and pools without spawning processes. [`FakeLauncher`]
//! plugs it into a [`SessionPool`] and counts launches.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};

use agent_switchboard::acp::reader::InboundHandler;
use agent_switchboard::acp::session::SessionOptions;
use agent_switchboard::acp::transport::Transport;
use agent_switchboard::events::{event_channel, AgentEvent, EventReceiver, EventSender};
use agent_switchboard::orchestrator::launcher::{establish, LaunchFuture, SessionLauncher};
use agent_switchboard::orchestrator::pool::{PoolSettings, SessionPool};

/// What the fake agent does with `session/prompt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    /// Stream a thought and `echo: <text>`, then end the turn.
    Echo,
    /// Never answer.
    Hang,
    /// Close the pipe as if the process died.
    Exit,
    /// Run one tool call through its full lifecycle, then end the turn.
    ToolRun,
    /// Ask for permission, report the answer as text, then end the turn.
    AskPermission,
}

/// In-memory ACP agent.
#[derive(Debug, Clone)]
pub struct FakeAgent {
    pub fail_initialize: bool,
    pub omit_session_id: bool,
    pub prompt: PromptBehavior,
    methods: Arc<Mutex<Vec<String>>>,
    sessions: Arc<AtomicUsize>,
}

impl FakeAgent {
    pub fn new(prompt: PromptBehavior) -> Self {
        Self {
            fail_initialize: false,
            omit_session_id: false,
            prompt,
            methods: Arc::new(Mutex::new(Vec::new())),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn echo() -> Self {
        Self::new(PromptBehavior::Echo)
    }

    /// Every method received so far, across all attached transports.
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    /// Connect a new transport to a fresh instance of this agent.
    pub fn attach(&self, label: &str, handler: Box<dyn InboundHandler>) -> Transport {
        let (client, agent) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        tokio::spawn(run_agent(agent, self.clone()));
        Transport::from_streams(label, client_read, client_write, handler)
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, value: Value) -> bool {
    let mut bytes = serde_json::to_vec(&value).unwrap();
    bytes.push(b'\n');
    writer.write_all(&bytes).await.is_ok() && writer.flush().await.is_ok()
}

fn update(session_id: &str, update: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "session/update",
        "params": { "sessionId": session_id, "update": update }
    })
}

fn chunk(session_id: &str, kind: &str, text: &str) -> Value {
    update(
        session_id,
        json!({ "sessionUpdate": kind, "content": { "type": "text", "text": text } }),
    )
}

#[allow(clippy::too_many_lines)]
async fn run_agent(stream: DuplexStream, agent: FakeAgent) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    let mut session_id = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let method = msg
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        agent.methods.lock().unwrap().push(method.clone());
        let id = msg.get("id").cloned().unwrap_or(Value::Null);

        let ok = match method.as_str() {
            "initialize" if agent.fail_initialize => {
                send(
                    &mut write,
                    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32000, "message": "unsupported version" } }),
                )
                .await
            }
            "initialize" => {
                send(
                    &mut write,
                    json!({ "jsonrpc": "2.0", "id": id, "result": { "protocolVersion": 1, "agentCapabilities": {} } }),
                )
                .await
            }
            "session/new" if agent.omit_session_id => {
                send(&mut write, json!({ "jsonrpc": "2.0", "id": id, "result": {} })).await
            }
            "session/new" => {
                let n = agent.sessions.fetch_add(1, Ordering::SeqCst) + 1;
                session_id = format!("sess-{n}");
                send(
                    &mut write,
                    json!({ "jsonrpc": "2.0", "id": id, "result": {
                        "sessionId": session_id,
                        "modes": { "currentModeId": "default" }
                    } }),
                )
                .await
            }
            "session/prompt" => {
                let text = msg["params"]["prompt"][0]["text"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned();
                match agent.prompt {
                    PromptBehavior::Hang => true,
                    PromptBehavior::Exit => return,
                    PromptBehavior::Echo => {
                        send(&mut write, chunk(&session_id, "agent_thought_chunk", "thinking")).await
                            && send(
                                &mut write,
                                chunk(&session_id, "agent_message_chunk", &format!("echo: {text}")),
                            )
                            .await
                            && send(
                                &mut write,
                                json!({ "jsonrpc": "2.0", "id": id, "result": { "stopReason": "end_turn" } }),
                            )
                            .await
                    }
                    PromptBehavior::ToolRun => {
                        let steps = [
                            update(&session_id, json!({
                                "sessionUpdate": "tool_call",
                                "toolCallId": "call-1",
                                "title": "bash",
                                "status": "pending"
                            })),
                            update(&session_id, json!({
                                "sessionUpdate": "tool_call_update",
                                "toolCallId": "call-1",
                                "status": "in_progress",
                                "rawInput": "{\"command\":\"ls -la\"}",
                                "_meta": { "toolName": "bash" }
                            })),
                            update(&session_id, json!({
                                "sessionUpdate": "tool_call_update",
                                "toolCallId": "call-1",
                                "status": "in_progress",
                                "content": [ { "type": "content", "content": { "type": "text", "text": "file-a\n" } } ]
                            })),
                            update(&session_id, json!({
                                "sessionUpdate": "tool_call_update",
                                "toolCallId": "call-1",
                                "status": "completed",
                                "content": [
                                    { "type": "content", "content": { "type": "image", "data": "aGVsbG8=", "mimeType": "image/png" } },
                                    { "type": "content", "content": { "type": "text", "text": "file-a\nfile-b" } }
                                ]
                            })),
                            chunk(&session_id, "agent_message_chunk", "done"),
                            json!({ "jsonrpc": "2.0", "id": id, "result": { "stopReason": "end_turn" } }),
                        ];
                        let mut ok = true;
                        for step in steps {
                            ok = ok && send(&mut write, step).await;
                        }
                        ok
                    }
                    PromptBehavior::AskPermission => {
                        let request = json!({
                            "jsonrpc": "2.0",
                            "id": "perm-1",
                            "method": "session/request_permission",
                            "params": {
                                "sessionId": session_id,
                                "toolCall": {
                                    "toolCallId": "call-9",
                                    "title": "write_file",
                                    "rawInput": { "path": "/etc/passwd" }
                                },
                                "options": [
                                    { "optionId": "yes", "name": "Allow", "kind": "allow_once" },
                                    { "optionId": "never", "name": "Reject always", "kind": "reject_always" },
                                    { "optionId": "no", "name": "Reject", "kind": "reject_once" }
                                ]
                            }
                        });
                        if !send(&mut write, request).await {
                            return;
                        }
                        let mut answer = Value::Null;
                        while let Ok(Some(line)) = lines.next_line().await {
                            let Ok(reply) = serde_json::from_str::<Value>(&line) else {
                                continue;
                            };
                            if reply.get("id") == Some(&json!("perm-1")) {
                                answer = reply["result"]["outcome"].clone();
                                break;
                            }
                        }
                        send(
                            &mut write,
                            chunk(&session_id, "agent_message_chunk", &format!("permission: {answer}")),
                        )
                        .await
                            && send(
                                &mut write,
                                json!({ "jsonrpc": "2.0", "id": id, "result": { "stopReason": "end_turn" } }),
                            )
                            .await
                    }
                }
            }
            _ => true,
        };
        if !ok {
            return;
        }
    }
}

/// Launcher that wires every session to a [`FakeAgent`].
#[derive(Debug)]
pub struct FakeLauncher {
    pub agent: FakeAgent,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(agent: FakeAgent) -> Self {
        Self {
            agent,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl SessionLauncher for FakeLauncher {
    fn launch(&self, options: SessionOptions, events: EventSender) -> LaunchFuture<'_> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let agent = self.agent.clone();
        Box::pin(async move {
            let label = options.channel_key.clone();
            establish(options, events, move |handler| {
                Ok(agent.attach(&label, handler))
            })
            .await
        })
    }
}

/// Session options suitable for tests: no settle delay, short deadline.
pub fn test_options(channel_key: &str, working_dir: &Path) -> SessionOptions {
    SessionOptions {
        channel_key: channel_key.to_owned(),
        working_dir: working_dir.to_path_buf(),
        protocol_version: 1,
        mcp_servers: Vec::new(),
        settle: Duration::ZERO,
        prompt_timeout: Some(Duration::from_secs(5)),
    }
}

/// Pool settings rooted at `root` with no settle delay and no rate limit.
pub fn test_settings(root: &Path) -> PoolSettings {
    PoolSettings {
        sessions_root: root.to_path_buf(),
        protocol_version: 1,
        mcp_servers: Vec::new(),
        settle: Duration::ZERO,
        prompt_timeout: Some(Duration::from_secs(5)),
        rate_limit: Duration::ZERO,
    }
}

/// A pool backed by `agent`, with its launcher and event receiver.
pub fn test_pool(
    settings: PoolSettings,
    agent: FakeAgent,
) -> (Arc<SessionPool>, Arc<FakeLauncher>, EventReceiver) {
    let (events_tx, events_rx) = event_channel();
    let launcher = Arc::new(FakeLauncher::new(agent));
    let pool = Arc::new(SessionPool::new(
        settings,
        Arc::clone(&launcher) as Arc<dyn SessionLauncher>,
        events_tx,
    ));
    (pool, launcher, events_rx)
}

/// Drain every event currently queued.
pub fn drain_events(rx: &mut EventReceiver) -> Vec<(String, AgentEvent)> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push((event.channel_key, event.event));
    }
    out
}
