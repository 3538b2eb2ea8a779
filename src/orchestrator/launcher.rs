//! How the pool brings a session to life.
//!
//! The pool never spawns processes itself; it asks a [`SessionLauncher`].
//! [`ProcessLauncher`] is the production implementation. Tests substitute
//! launchers that wire sessions to in-memory agents.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::acp::reader::InboundHandler;
use crate::acp::session::{AcpSession, SessionOptions};
use crate::acp::spawner::SpawnConfig;
use crate::acp::transport::Transport;
use crate::config::GlobalConfig;
use crate::events::EventSender;
use crate::Result;

/// Future returned by [`SessionLauncher::launch`].
pub type LaunchFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<AcpSession>>> + Send + 'a>>;

/// Produces ready-to-prompt sessions.
pub trait SessionLauncher: Send + Sync {
    /// Connect and create a session for `options`.
    ///
    /// # Errors
    ///
    /// Returns the connection failure (`ProcessSpawn`, `Initialize`,
    /// `SessionCreate`, `NotConnected`) that prevented the session.
    fn launch(&self, options: SessionOptions, events: EventSender) -> LaunchFuture<'_>;
}

/// Run the handshake on a new session over the transport built by `open`.
///
/// The session is disconnected again if any step fails.
///
/// # Errors
///
/// Returns the first failure of `connect` or `create_session`.
pub async fn establish<F>(options: SessionOptions, events: EventSender, open: F) -> Result<Arc<AcpSession>>
where
    F: FnOnce(Box<dyn InboundHandler>) -> Result<Transport> + Send,
{
    let session = Arc::new(AcpSession::new(options, events));
    session.connect(open).await?;
    if let Err(err) = session.create_session().await {
        session.disconnect().await;
        return Err(err);
    }
    Ok(session)
}

/// Launches one agent subprocess per session.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    agent_cli: String,
    agent_cli_args: Vec<String>,
    env_passthrough: Vec<String>,
}

impl ProcessLauncher {
    /// Launcher for the agent named in `config`.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            agent_cli: config.agent_cli.clone(),
            agent_cli_args: config.agent_cli_args.clone(),
            env_passthrough: config.env_passthrough.clone(),
        }
    }
}

impl SessionLauncher for ProcessLauncher {
    fn launch(&self, options: SessionOptions, events: EventSender) -> LaunchFuture<'_> {
        let spawn = SpawnConfig {
            agent_cli: self.agent_cli.clone(),
            agent_cli_args: self.agent_cli_args.clone(),
            working_dir: options.working_dir.clone(),
            env_passthrough: self.env_passthrough.clone(),
        };
        let label = options.channel_key.clone();
        Box::pin(establish(options, events, move |handler| {
            Transport::start(label, &spawn, handler)
        }))
    }
}
