//! Slash commands understood by the console connector.

use crate::orchestrator::pool::ChannelStatus;

/// Text shown for `/help`.
pub const HELP_TEXT: &str = "\
Commands:
  /clear   end this channel's agent session; the next message starts a new one
  /reset   same as /clear, and forget your rate-limit history
  /status  show this channel's session details
  /help    show this message";

/// A recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Drop the channel's session.
    Clear,
    /// Drop the channel's session and the user's rate-limit entry.
    Reset,
    /// Show the channel's status.
    Status,
    /// Show the command list.
    Help,
}

/// Parse `text` as a command. Accepts an optional `@botname` suffix
/// (`/clear@switchboard`) and ignores trailing arguments.
#[must_use]
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split_once('@').map_or(name, |(head, _)| head);
    match name.to_ascii_lowercase().as_str() {
        "clear" | "new" => Some(Command::Clear),
        "reset" => Some(Command::Reset),
        "status" => Some(Command::Status),
        "help" | "start" => Some(Command::Help),
        _ => None,
    }
}

/// Render a `/status` reply.
#[must_use]
pub fn format_status(channel_key: &str, status: Option<&ChannelStatus>) -> String {
    let Some(status) = status else {
        return format!("No active session for {channel_key}. Send a message to start one.");
    };

    let mut lines = vec![
        format!("Channel: {}", status.channel_key),
        format!(
            "Session: {}",
            status.session_id.as_deref().unwrap_or("(pending)")
        ),
        format!("State: {:?}", status.state),
    ];
    if let Some(mode) = &status.mode {
        lines.push(format!("Mode: {mode}"));
    }
    lines.push(format!("Directory: {}", status.working_dir.display()));
    lines.push(format!(
        "Started: {}",
        status.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(format!(
        "Last activity: {}",
        status.last_activity.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.push(format!("Messages: {}", status.message_count));
    lines.push(format!(
        "Tokens (est.): {} in / {} out",
        status.input_tokens, status.output_tokens
    ));
    lines.join("\n")
}
