#![forbid(unsafe_code)]

//! Multiplexes isolated chat-channel conversations onto subprocess-hosted
//! agents speaking the Agent Client Protocol.

pub mod acp;
pub mod activity;
pub mod config;
pub mod connector;
pub mod errors;
pub mod events;
pub mod markers;
pub mod orchestrator;
pub mod rate_limit;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use events::{AgentEvent, ChannelEvent};
