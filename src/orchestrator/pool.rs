//! Multi-channel session pool.
//!
//! Maps a channel key to exactly one live [`AcpSession`], created lazily on
//! the channel's first message and kept until it is removed explicitly. Each
//! session runs its own agent process in its own working directory, so
//! channels share nothing but the event channel, on which every event is
//! tagged with its channel key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::acp::session::{AcpSession, SessionOptions, SessionState};
use crate::config::GlobalConfig;
use crate::events::EventSender;
use crate::orchestrator::launcher::SessionLauncher;
use crate::orchestrator::{retention, workspace};
use crate::rate_limit::RateLimiter;
use crate::Result;

/// Rough token count for `chars` characters of text: `round(chars / 4)`,
/// never negative.
#[must_use]
pub fn estimate_tokens(chars: i64) -> u64 {
    if chars <= 0 {
        return 0;
    }
    u64::try_from(chars.saturating_add(2) / 4).unwrap_or(0)
}

/// Settings applied to every session the pool creates.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Parent of the per-channel working directories.
    pub sessions_root: PathBuf,
    /// Protocol version announced in `initialize`.
    pub protocol_version: u32,
    /// MCP server descriptors forwarded in `session/new`.
    pub mcp_servers: Vec<Value>,
    /// Pause after `session/new`.
    pub settle: Duration,
    /// Prompt deadline.
    pub prompt_timeout: Option<Duration>,
    /// Minimum interval between accepted messages per user.
    pub rate_limit: Duration,
}

impl PoolSettings {
    /// Settings derived from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            sessions_root: config.sessions_root.clone(),
            protocol_version: config.protocol_version,
            mcp_servers: config.mcp_servers.clone(),
            settle: config.session_settle(),
            prompt_timeout: config.prompt_timeout(),
            rate_limit: config.rate_limit(),
        }
    }
}

/// Snapshot of one channel, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel key.
    pub channel_key: String,
    /// Agent-assigned session id.
    pub session_id: Option<String>,
    /// Current session mode.
    pub mode: Option<String>,
    /// Lifecycle state of the session.
    pub state: SessionState,
    /// Working directory.
    pub working_dir: PathBuf,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// Last tracked exchange.
    pub last_activity: DateTime<Utc>,
    /// Number of tracked exchanges.
    pub message_count: u64,
    /// Characters sent to the agent.
    pub input_chars: i64,
    /// Characters received from the agent.
    pub output_chars: i64,
    /// Estimated input tokens.
    pub input_tokens: u64,
    /// Estimated output tokens.
    pub output_tokens: u64,
}

#[derive(Debug)]
struct PoolEntry {
    session: Arc<AcpSession>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: u64,
    input_chars: i64,
    output_chars: i64,
}

/// Owner of every live channel session.
pub struct SessionPool {
    settings: PoolSettings,
    launcher: Arc<dyn SessionLauncher>,
    events: EventSender,
    entries: Mutex<HashMap<String, PoolEntry>>,
    rate_limiter: RateLimiter,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new(settings: PoolSettings, launcher: Arc<dyn SessionLauncher>, events: EventSender) -> Self {
        Self {
            settings,
            launcher,
            events,
            entries: Mutex::new(HashMap::new()),
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Pool settings.
    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Session for `channel_key`, creating it on first use.
    ///
    /// An entry whose agent has gone away is replaced. If two callers race
    /// to create the same channel, the first one stored wins and the other
    /// session is disconnected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the working directory cannot be created,
    /// or the launcher's connection failure.
    pub async fn get_or_create(&self, channel_key: &str) -> Result<Arc<AcpSession>> {
        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get(channel_key) {
                if entry.session.state() != SessionState::Disconnected {
                    return Ok(Arc::clone(&entry.session));
                }
                warn!(channel_key, "replacing session whose agent has gone away");
                entries.remove(channel_key);
            }
        }

        let span = info_span!("pool_create", channel_key);
        async move {
            let working_dir = workspace::ensure_channel_dir(&self.settings.sessions_root, channel_key)?;
            let options = SessionOptions {
                channel_key: channel_key.to_owned(),
                working_dir,
                protocol_version: self.settings.protocol_version,
                mcp_servers: self.settings.mcp_servers.clone(),
                settle: self.settings.settle,
                prompt_timeout: self.settings.prompt_timeout,
            };
            let session = self.launcher.launch(options, self.events.clone()).await?;

            let raced = {
                let mut entries = self.entries.lock().await;
                if let Some(existing) = entries.get(channel_key) {
                    Some(Arc::clone(&existing.session))
                } else {
                    let now = Utc::now();
                    entries.insert(
                        channel_key.to_owned(),
                        PoolEntry {
                            session: Arc::clone(&session),
                            created_at: now,
                            last_activity: now,
                            message_count: 0,
                            input_chars: 0,
                            output_chars: 0,
                        },
                    );
                    None
                }
            };

            if let Some(existing) = raced {
                session.disconnect().await;
                return Ok(existing);
            }
            info!(session_id = ?session.session_id(), "channel session created");
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// Record one exchange on `channel_key`. Negative counts are ignored.
    pub async fn track_message(&self, channel_key: &str, input_chars: i64, output_chars: i64) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(channel_key) {
            entry.message_count += 1;
            entry.input_chars += input_chars.max(0);
            entry.output_chars += output_chars.max(0);
            entry.last_activity = Utc::now();
        }
    }

    /// Disconnect and forget `channel_key`'s session. Returns whether
    /// there was one. The next message on the channel starts fresh.
    pub async fn remove(&self, channel_key: &str) -> bool {
        let entry = self.entries.lock().await.remove(channel_key);
        match entry {
            Some(entry) => {
                entry.session.disconnect().await;
                info!(channel_key, "channel session removed");
                true
            }
            None => false,
        }
    }

    /// Status snapshot of `channel_key`, if it has a session.
    pub async fn status(&self, channel_key: &str) -> Option<ChannelStatus> {
        let entries = self.entries.lock().await;
        entries.get(channel_key).map(|entry| ChannelStatus {
            channel_key: channel_key.to_owned(),
            session_id: entry.session.session_id(),
            mode: entry.session.current_mode(),
            state: entry.session.state(),
            working_dir: entry.session.working_dir().to_path_buf(),
            created_at: entry.created_at,
            last_activity: entry.last_activity,
            message_count: entry.message_count,
            input_chars: entry.input_chars,
            output_chars: entry.output_chars,
            input_tokens: estimate_tokens(entry.input_chars),
            output_tokens: estimate_tokens(entry.output_chars),
        })
    }

    /// Keys of every channel with a session, sorted.
    pub async fn channel_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `user` may send a message now under the configured rate
    /// limit.
    pub fn check_rate(&self, user: &str) -> bool {
        self.rate_limiter.check(user, self.settings.rate_limit)
    }

    /// Forget `user`'s rate-limit history.
    pub fn reset_rate(&self, user: &str) {
        self.rate_limiter.reset(user);
    }

    /// Delete working directories older than `max_age_days`. Startup only;
    /// live entries are not affected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the sessions root cannot be listed.
    pub fn sweep_stale(&self, max_age_days: u32) -> Result<usize> {
        retention::sweep_stale(&self.settings.sessions_root, max_age_days)
    }

    /// Root directory for channel working directories.
    #[must_use]
    pub fn sessions_root(&self) -> &Path {
        &self.settings.sessions_root
    }

    /// Disconnect every session.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, PoolEntry)> = self.entries.lock().await.drain().collect();
        for (channel_key, entry) in drained {
            entry.session.disconnect().await;
            info!(channel_key = %channel_key, "channel session shut down");
        }
    }
}
