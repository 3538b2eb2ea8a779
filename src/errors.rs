//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// The first four protocol variants are fatal to the channel that raised
/// them. Tool failures and permission denials are never errors; they travel
/// as [`AgentEvent`](crate::events::AgentEvent) data.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// ACP framing, serialisation, or transport failure.
    Acp(String),
    /// The agent executable could not be located or launched.
    ProcessSpawn(String),
    /// The agent answered `initialize` with an error.
    Initialize(String),
    /// `session/new` failed or returned no session id.
    SessionCreate(String),
    /// The transport is closed or the session was never established.
    NotConnected(String),
    /// A call did not receive its response before the deadline.
    Timeout(String),
    /// A prompt is already in flight on this session.
    Busy(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::ProcessSpawn(msg) => write!(f, "process spawn: {msg}"),
            Self::Initialize(msg) => write!(f, "initialize: {msg}"),
            Self::SessionCreate(msg) => write!(f, "session create: {msg}"),
            Self::NotConnected(msg) => write!(f, "not connected: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether this error ends the channel's session attempt.
    ///
    /// Connectors show a generic "could not connect" message for these and
    /// drop the pool entry.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::ProcessSpawn(_)
                | Self::Initialize(_)
                | Self::SessionCreate(_)
                | Self::NotConnected(_)
        )
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
