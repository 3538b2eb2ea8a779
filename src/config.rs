//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_agent_cli_args() -> Vec<String> {
    vec!["--acp".into()]
}

fn default_protocol_version() -> u32 {
    1
}

fn default_session_settle_ms() -> u64 {
    1500
}

fn default_prompt_timeout_seconds() -> u64 {
    900
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent executable (e.g., `copilot`, `gemini`).
    pub agent_cli: String,
    /// Arguments for the agent executable; selects the ACP protocol mode.
    #[serde(default = "default_agent_cli_args")]
    pub agent_cli_args: Vec<String>,
    /// Directory under which every channel gets its own working directory.
    pub sessions_root: PathBuf,
    /// Extra environment variables inherited by the agent process, on top
    /// of the spawner's built-in allowlist.
    #[serde(default)]
    pub env_passthrough: Vec<String>,
    /// ACP protocol version announced in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// Pause after `session/new` before the first prompt is accepted.
    #[serde(default = "default_session_settle_ms")]
    pub session_settle_ms: u64,
    /// Prompt deadline; 0 means no deadline.
    #[serde(default = "default_prompt_timeout_seconds")]
    pub prompt_timeout_seconds: u64,
    /// Minimum seconds between accepted messages per user; 0 disables.
    #[serde(default)]
    pub rate_limit_seconds: u64,
    /// Age after which idle channel directories are deleted at startup;
    /// 0 disables the sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// MCP server descriptors forwarded verbatim in `session/new`.
    #[serde(default)]
    pub mcp_servers: Vec<serde_json::Value>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Settle period applied after `session/new`.
    #[must_use]
    pub fn session_settle(&self) -> Duration {
        Duration::from_millis(self.session_settle_ms)
    }

    /// Prompt deadline, or `None` when prompts may run indefinitely.
    #[must_use]
    pub fn prompt_timeout(&self) -> Option<Duration> {
        (self.prompt_timeout_seconds > 0).then(|| Duration::from_secs(self.prompt_timeout_seconds))
    }

    /// Minimum interval between accepted messages from one user.
    #[must_use]
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.agent_cli.trim().is_empty() {
            return Err(AppError::Config("agent_cli must not be empty".into()));
        }

        if self.protocol_version == 0 {
            return Err(AppError::Config(
                "protocol_version must be greater than zero".into(),
            ));
        }

        if self.sessions_root.as_os_str().is_empty() {
            return Err(AppError::Config("sessions_root must not be empty".into()));
        }

        if let Some(bad) = self.mcp_servers.iter().find(|s| !s.is_object()) {
            return Err(AppError::Config(format!(
                "mcp_servers entries must be tables, got {bad}"
            )));
        }

        Ok(())
    }
}
