//! Event surface consumed by chat connectors.
//!
//! Every session publishes onto one tagged-union channel; connectors read
//! [`ChannelEvent`]s and dispatch on [`AgentEvent`]. Within one channel the
//! events arrive in the order the agent emitted them.

use tokio::sync::mpsc;

use crate::activity::Activity;

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool ran and produced output.
    Completed,
    /// The tool reported a failure; the result text is its error message.
    Failed,
}

/// One thing a session reports while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Streamed fragment of the agent's reply.
    TextChunk {
        /// Text fragment.
        text: String,
    },
    /// Streamed fragment of the agent's reasoning.
    ReasoningChunk {
        /// Text fragment.
        text: String,
    },
    /// A tool call is running with known arguments.
    Activity {
        /// Tool call identifier.
        call_id: String,
        /// Friendly description and raw tool name.
        activity: Activity,
    },
    /// Incremental output of a running tool, forwarded as it arrives.
    OutputDelta {
        /// Tool call identifier.
        call_id: String,
        /// Output fragment.
        text: String,
    },
    /// Image produced by a tool; precedes the call's result.
    Image {
        /// Tool call identifier.
        call_id: String,
        /// MIME type, e.g. `image/png`.
        mime_type: String,
        /// Base64-encoded image data.
        data: String,
    },
    /// Final result of a tool call. Emitted at most once per call.
    ToolResult {
        /// Tool call identifier.
        call_id: String,
        /// Raw tool name.
        tool_name: String,
        /// Aggregated output or error message.
        text: String,
        /// Whether the tool succeeded.
        outcome: ToolOutcome,
    },
    /// A tool call reached a terminal state. Emitted exactly once per call.
    ActivityEnd {
        /// Tool call identifier.
        call_id: String,
    },
    /// A permission request was answered with a rejection.
    PermissionRejected {
        /// What was asked for.
        permission: String,
        /// Path involved, when the request named one.
        path: Option<String>,
        /// Display message.
        message: String,
    },
    /// The agent switched session mode.
    ModeChanged {
        /// New mode identifier.
        mode: String,
    },
    /// The agent process went away without being asked to.
    SessionTerminated {
        /// Why the stream ended.
        reason: String,
    },
}

/// An [`AgentEvent`] tagged with the channel it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Channel the originating session serves.
    pub channel_key: String,
    /// The event itself.
    pub event: AgentEvent,
}

/// Sending half of the event channel.
pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

/// Create the event channel shared by a pool and its connector.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
