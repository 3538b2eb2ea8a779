//! Agent Client Protocol (ACP) client.
//!
//! One agent process speaks NDJSON JSON-RPC 2.0 over its stdio. The layers,
//! leaves first:
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing with a line cap.
//! - `spawner`: process launch with environment isolation and stdio capture.
//! - `correlator`: outstanding calls keyed by request id.
//! - `reader` / `writer`: the two stream tasks.
//! - `transport`: ties the above together behind `call` / `notify`.
//! - `handshake`: request payload builders and response parsers.
//! - `notifications`: `session/update` → [`AgentEvent`](crate::events::AgentEvent).
//! - `permission`: rejects every `session/request_permission`.
//! - `session`: initialize → session/new → prompt lifecycle.

pub mod codec;
pub mod correlator;
pub mod handshake;
pub mod notifications;
pub mod permission;
pub mod reader;
pub mod session;
pub mod spawner;
pub mod transport;
pub mod writer;
