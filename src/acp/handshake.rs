//! ACP request payloads and response parsing.
//!
//! The client side of the conversation is three calls and one
//! notification:
//!
//! 1. `initialize`: announces the protocol version and that this client
//!    offers no file-system or terminal capabilities.
//! 2. `session/new`: opens a conversation rooted at the channel's working
//!    directory, with the configured MCP servers.
//! 3. `session/prompt`: one user turn; resolves when the agent finishes.
//! 4. `session/cancel`: asks the agent to abandon the running turn.
//!
//! Builders return the `params` object; the transport adds the envelope.

use std::path::Path;

use serde_json::{json, Value};

use crate::acp::transport::response_result;
use crate::{AppError, Result};

/// What the agent reported during `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    /// Protocol version the agent agreed to.
    pub protocol_version: Option<u64>,
    /// Raw `agentCapabilities` object.
    pub capabilities: Value,
}

/// Result of a successful `session/new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// Agent-assigned session identifier.
    pub session_id: String,
    /// Mode the session starts in, if the agent supports modes.
    pub current_mode: Option<String>,
}

/// Params for `initialize`.
#[must_use]
pub fn initialize_params(protocol_version: u32) -> Value {
    json!({
        "protocolVersion": protocol_version,
        "clientCapabilities": {
            "fs": { "readTextFile": false, "writeTextFile": false },
            "terminal": false
        },
        "clientInfo": {
            "name": "agent-switchboard",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Interpret the response to `initialize`.
///
/// # Errors
///
/// Returns [`AppError::Initialize`] if the response carries an `error`.
pub fn parse_initialize(response: &Value) -> Result<AgentInfo> {
    let result = response_result(response).map_err(AppError::Initialize)?;
    Ok(AgentInfo {
        protocol_version: result.get("protocolVersion").and_then(Value::as_u64),
        capabilities: result
            .get("agentCapabilities")
            .cloned()
            .unwrap_or(Value::Null),
    })
}

/// Params for `session/new`.
#[must_use]
pub fn session_new_params(cwd: &Path, mcp_servers: &[Value]) -> Value {
    json!({
        "cwd": cwd.to_string_lossy(),
        "mcpServers": mcp_servers,
    })
}

/// Interpret the response to `session/new`.
///
/// # Errors
///
/// Returns [`AppError::SessionCreate`] if the response carries an `error`
/// or no non-empty `sessionId`.
pub fn parse_session_new(response: &Value) -> Result<NewSession> {
    let result = response_result(response).map_err(AppError::SessionCreate)?;

    let session_id = result
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::SessionCreate("response carried no sessionId".into()))?;

    let current_mode = result
        .get("modes")
        .and_then(|modes| modes.get("currentModeId"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Ok(NewSession {
        session_id: session_id.to_owned(),
        current_mode,
    })
}

/// Params for `session/prompt` carrying a single text block.
#[must_use]
pub fn prompt_params(session_id: &str, text: &str) -> Value {
    json!({
        "sessionId": session_id,
        "prompt": [ { "type": "text", "text": text } ],
    })
}

/// Stop reason from a `session/prompt` response, if any.
///
/// # Errors
///
/// Returns the agent's error message if the prompt failed.
pub fn parse_prompt(response: &Value) -> std::result::Result<Option<String>, String> {
    let result = response_result(response)?;
    Ok(result
        .get("stopReason")
        .and_then(Value::as_str)
        .map(str::to_owned))
}

/// Params for the `session/cancel` notification.
#[must_use]
pub fn cancel_params(session_id: &str) -> Value {
    json!({ "sessionId": session_id })
}
