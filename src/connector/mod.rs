//! Console connector.
//!
//! A line-oriented stand-in for a chat platform adapter. Each input line is
//! `channel[@user] text`; the connector routes it through the
//! [`SessionPool`], assembles the reply, and renders the pool's events as
//! one-line notices. Platform adapters would replace the parsing and the
//! rendering and keep the rest.

pub mod commands;
pub mod queue;

use tracing::{debug, warn};

use crate::connector::commands::{format_status, parse_command, Command, HELP_TEXT};
use crate::events::{AgentEvent, ChannelEvent, ToolOutcome};
use crate::markers::{extract_image_markers, strip_image_markers};
use crate::orchestrator::pool::SessionPool;
use crate::AppError;

/// User id assumed when a line names none.
pub const DEFAULT_USER: &str = "console";

/// One message from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel the message arrived on.
    pub channel_key: String,
    /// Sender, for rate limiting.
    pub user: String,
    /// Message body.
    pub text: String,
}

/// What the connector sends back to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    /// Destination channel.
    pub channel_key: String,
    /// Reply text with image markers removed.
    pub text: String,
    /// Paths of images the agent asked to attach.
    pub images: Vec<String>,
}

impl OutboundReply {
    fn plain(channel_key: &str, text: impl Into<String>) -> Self {
        Self {
            channel_key: channel_key.to_owned(),
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// Parse an input line of the form `channel[@user] text`.
///
/// Returns `None` for blank lines and lines with no text after the channel.
#[must_use]
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let (head, text) = line.trim().split_once(char::is_whitespace)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (channel, user) = match head.split_once('@') {
        Some((channel, user)) if !user.is_empty() => (channel, user),
        Some((channel, _)) => (channel, DEFAULT_USER),
        None => (head, DEFAULT_USER),
    };
    if channel.is_empty() {
        return None;
    }
    Some(InboundMessage {
        channel_key: channel.to_owned(),
        user: user.to_owned(),
        text: text.to_owned(),
    })
}

/// Handle one message end to end and produce the channel's reply.
pub async fn handle_message(pool: &SessionPool, message: InboundMessage) -> OutboundReply {
    let InboundMessage {
        channel_key,
        user,
        text,
    } = message;

    if let Some(command) = parse_command(&text) {
        return run_command(pool, &channel_key, &user, command).await;
    }

    if !pool.check_rate(&user) {
        debug!(channel_key = %channel_key, %user, "message rate limited");
        return OutboundReply::plain(
            &channel_key,
            "You're sending messages too quickly. Please wait a moment.",
        );
    }

    let session = match pool.get_or_create(&channel_key).await {
        Ok(session) => session,
        Err(err) if err.is_connection_failure() => {
            warn!(channel_key = %channel_key, %err, "could not connect to agent");
            return OutboundReply::plain(&channel_key, "Could not connect to the agent. Please try again later.");
        }
        Err(err) => {
            warn!(channel_key = %channel_key, %err, "session setup failed");
            return OutboundReply::plain(&channel_key, "Could not start an agent session. Please try again later.");
        }
    };

    let reply = match session.prompt(&text).await {
        Ok(reply) => reply,
        Err(AppError::Busy(_)) => {
            return OutboundReply::plain(&channel_key, "Still working on the previous message.");
        }
        Err(AppError::Timeout(_)) => {
            return OutboundReply::plain(
                &channel_key,
                "The agent took too long and the request was cancelled.",
            );
        }
        Err(err) => {
            warn!(channel_key = %channel_key, %err, "prompt failed");
            return OutboundReply::plain(&channel_key, format!("Agent error: {err}"));
        }
    };

    pool.track_message(&channel_key, char_count(&text), char_count(&reply.text))
        .await;

    let images = extract_image_markers(&reply.text);
    let mut body = strip_image_markers(&reply.text);
    if body.is_empty() && images.is_empty() {
        body = "(no reply)".to_owned();
    }
    OutboundReply {
        channel_key,
        text: body,
        images,
    }
}

async fn run_command(pool: &SessionPool, channel_key: &str, user: &str, command: Command) -> OutboundReply {
    let text = match command {
        Command::Clear | Command::Reset => {
            if command == Command::Reset {
                pool.reset_rate(user);
            }
            if pool.remove(channel_key).await {
                "Session cleared. The next message starts a new conversation.".to_owned()
            } else {
                "No active session to clear.".to_owned()
            }
        }
        Command::Status => format_status(channel_key, pool.status(channel_key).await.as_ref()),
        Command::Help => HELP_TEXT.to_owned(),
    };
    OutboundReply::plain(channel_key, text)
}

fn char_count(text: &str) -> i64 {
    i64::try_from(text.chars().count()).unwrap_or(i64::MAX)
}

/// One-line rendering of a session event, or `None` for events the console
/// does not show (streamed text arrives in the assembled reply instead).
#[must_use]
pub fn format_event(event: &ChannelEvent) -> Option<String> {
    let key = &event.channel_key;
    let line = match &event.event {
        AgentEvent::Activity { activity, .. } => format!("[{key}] ⚙ {}", activity.description),
        AgentEvent::ToolResult {
            tool_name,
            text,
            outcome: ToolOutcome::Failed,
            ..
        } => format!("[{key}] ✗ {tool_name}: {}", first_line(text)),
        AgentEvent::Image { mime_type, .. } => format!("[{key}] 🖼 tool produced an image ({mime_type})"),
        AgentEvent::PermissionRejected { message, .. } => format!("[{key}] ⛔ {message}"),
        AgentEvent::ModeChanged { mode } => format!("[{key}] mode: {mode}"),
        AgentEvent::SessionTerminated { reason } => format!("[{key}] session ended: {reason}"),
        AgentEvent::TextChunk { .. }
        | AgentEvent::ReasoningChunk { .. }
        | AgentEvent::OutputDelta { .. }
        | AgentEvent::ToolResult { .. }
        | AgentEvent::ActivityEnd { .. } => return None,
    };
    Some(line)
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
