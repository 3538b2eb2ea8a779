//! ACP reader task.
//!
//! Reads newline-delimited JSON from the agent's stdout and routes each
//! message by shape:
//!
//! | Shape                          | Routed to                               |
//! |--------------------------------|-----------------------------------------|
//! | `id`, no `method`              | [`PendingCalls::resolve`]               |
//! | `method` and `id`              | [`InboundHandler::on_request`], answered |
//! | `method`, no `id`              | [`InboundHandler::on_notification`]     |
//! | anything else / not JSON       | Skipped; logged at `DEBUG`              |
//!
//! The handler runs inline on the reader task, so every notification is
//! fully processed before any later line (including the response that ends
//! a prompt) is looked at.

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::acp::codec::AcpCodec;
use crate::acp::correlator::PendingCalls;
use crate::{AppError, Result};

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Error object returned for a server-initiated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcError {
    /// The request named a method this client does not implement.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
        }
    }
}

/// Receiver of everything the agent sends that is not a call response.
///
/// Implementations run on the reader task and must not block.
pub trait InboundHandler: Send + 'static {
    /// A notification (`method` without `id`).
    fn on_notification(&mut self, method: &str, params: Value);

    /// A server-initiated request. The returned value becomes the
    /// `result` (or `error`) of the reply written back to the agent.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcError`] to send an error reply.
    fn on_request(&mut self, method: &str, params: Value) -> std::result::Result<Value, RpcError>;

    /// The reader stopped, either because the agent went away or because
    /// the transport was cancelled.
    fn on_closed(&mut self, _reason: &str) {}
}

/// One routed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Response to one of our calls.
    Response {
        /// Numeric id of the call being answered.
        id: u64,
        /// The complete response object, including any `error` member.
        message: Value,
    },
    /// Request from the agent that expects a reply.
    Request {
        /// The agent's id, echoed back verbatim.
        id: Value,
        /// Requested method.
        method: String,
        /// Method parameters.
        params: Value,
    },
    /// Notification from the agent.
    Notification {
        /// Notification method.
        method: String,
        /// Method parameters.
        params: Value,
    },
}

/// Parse and classify one line from the agent.
///
/// # Return value
///
/// - `Ok(Some(inbound))`: a routable message.
/// - `Ok(None)`: blank line, or JSON that is neither a response nor carries
///   a method.
/// - `Err(AppError::Acp(..))`: not valid JSON.
///
/// # Errors
///
/// [`AppError::Acp`]`("malformed json: …")` for a line that does not parse.
pub fn classify_line(line: &str) -> Result<Option<Inbound>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut value: Value =
        serde_json::from_str(trimmed).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;

    let Some(obj) = value.as_object_mut() else {
        return Ok(None);
    };

    let method = obj.get("method").and_then(Value::as_str).map(str::to_owned);
    let id = obj.get("id").filter(|v| !v.is_null()).cloned();

    let inbound = match (method, id) {
        (Some(method), Some(id)) => Some(Inbound::Request {
            id,
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        }),
        (Some(method), None) => Some(Inbound::Notification {
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        }),
        (None, Some(id)) => numeric_id(&id).map(|id| Inbound::Response { id, message: value }),
        (None, None) => None,
    };

    Ok(inbound)
}

/// Read loop over the agent's stdout.
///
/// Exits on cancellation, on EOF, or on an unrecoverable I/O error. The
/// handler is told the stream closed in every case. On EOF or I/O error
/// every pending call is also rejected and `cancel` is fired so the rest of
/// the transport stops.
pub async fn run_reader<R>(
    label: String,
    stdout: R,
    mut handler: Box<dyn InboundHandler>,
    pending: PendingCalls,
    replies: mpsc::Sender<Value>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AcpCodec::new());

    let reason = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(channel_key = %label, "acp reader: cancellation received, stopping");
                let reason = pending
                    .close_reason()
                    .await
                    .unwrap_or_else(|| "transport cancelled".to_owned());
                handler.on_closed(&reason);
                return;
            }

            item = framed.next() => match item {
                None => break "agent stdout closed".to_owned(),

                // The codec skips oversized and undecodable lines itself, so
                // an error here is a real read failure.
                Some(Err(e)) => break format!("agent stdout error: {e}"),

                Some(Ok(line)) => match classify_line(&line) {
                    Ok(Some(inbound)) => {
                        dispatch(&label, inbound, handler.as_mut(), &pending, &replies).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(channel_key = %label, error = %e, raw_line = %line, "acp reader: skipping non-protocol line");
                    }
                },
            },
        }
    };

    let rejected = pending.close(&reason).await;
    debug!(channel_key = %label, %reason, rejected, "acp reader: stream ended");
    handler.on_closed(&reason);
    cancel.cancel();
}

async fn dispatch(
    label: &str,
    inbound: Inbound,
    handler: &mut dyn InboundHandler,
    pending: &PendingCalls,
    replies: &mpsc::Sender<Value>,
) {
    match inbound {
        Inbound::Response { id, message } => {
            if !pending.resolve(id, message).await {
                debug!(channel_key = %label, call_id = id, "acp reader: response for unknown call id");
            }
        }
        Inbound::Notification { method, params } => handler.on_notification(&method, params),
        Inbound::Request { id, method, params } => {
            let reply = match handler.on_request(&method, params) {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                Err(err) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": err.code, "message": err.message },
                }),
            };
            if replies.send(reply).await.is_err() {
                debug!(channel_key = %label, method, "acp reader: writer gone, reply dropped");
            }
        }
    }
}

fn numeric_id(id: &Value) -> Option<u64> {
    id.as_u64()
        .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
}
