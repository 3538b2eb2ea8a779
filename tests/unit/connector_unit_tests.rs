//! Unit tests for console line parsing, commands, and event rendering.

use std::path::PathBuf;

use chrono::Utc;

use agent_switchboard::acp::session::SessionState;
use agent_switchboard::activity::describe;
use agent_switchboard::connector::commands::{format_status, parse_command, Command};
use agent_switchboard::connector::{format_event, parse_line, DEFAULT_USER};
use agent_switchboard::events::{AgentEvent, ChannelEvent, ToolOutcome};
use agent_switchboard::orchestrator::pool::ChannelStatus;
use serde_json::json;

// ── parse_line ──────────────────────────────────────────────────────────────

#[test]
fn line_with_user() {
    let msg = parse_line("ops@alice  deploy the thing ").unwrap();
    assert_eq!(msg.channel_key, "ops");
    assert_eq!(msg.user, "alice");
    assert_eq!(msg.text, "deploy the thing");
}

#[test]
fn line_without_user_uses_default() {
    let msg = parse_line("general hello").unwrap();
    assert_eq!(msg.channel_key, "general");
    assert_eq!(msg.user, DEFAULT_USER);

    let trailing_at = parse_line("general@ hi").unwrap();
    assert_eq!(trailing_at.user, DEFAULT_USER);
}

#[test]
fn incomplete_lines_are_skipped() {
    assert!(parse_line("").is_none());
    assert!(parse_line("   ").is_none());
    assert!(parse_line("general").is_none());
    assert!(parse_line("@bob hi").is_none());
}

// ── parse_command ───────────────────────────────────────────────────────────

#[test]
fn commands_and_aliases() {
    assert_eq!(parse_command("/clear"), Some(Command::Clear));
    assert_eq!(parse_command("/new"), Some(Command::Clear));
    assert_eq!(parse_command("/Reset"), Some(Command::Reset));
    assert_eq!(parse_command("/status@switchboard"), Some(Command::Status));
    assert_eq!(parse_command("/help me"), Some(Command::Help));
    assert_eq!(parse_command("/start"), Some(Command::Help));
}

#[test]
fn non_commands() {
    assert_eq!(parse_command("clear"), None);
    assert_eq!(parse_command("/deploy"), None);
    assert_eq!(parse_command("please /clear"), None);
    assert_eq!(parse_command(""), None);
}

// ── format_status ───────────────────────────────────────────────────────────

#[test]
fn status_without_session() {
    let text = format_status("ops", None);
    assert!(text.starts_with("No active session for ops"));
}

#[test]
fn status_lists_session_details() {
    let now = Utc::now();
    let status = ChannelStatus {
        channel_key: "ops".into(),
        session_id: Some("s-42".into()),
        mode: None,
        state: SessionState::Idle,
        working_dir: PathBuf::from("/srv/ops-1234"),
        created_at: now,
        last_activity: now,
        message_count: 3,
        input_chars: 40,
        output_chars: 400,
        input_tokens: 10,
        output_tokens: 100,
    };
    let text = format_status("ops", Some(&status));
    assert!(text.contains("Session: s-42"));
    assert!(text.contains("State: Idle"));
    assert!(text.contains("Directory: /srv/ops-1234"));
    assert!(text.contains("Messages: 3"));
    assert!(text.contains("10 in / 100 out"));
    assert!(!text.contains("Mode:"));
}

// ── format_event ────────────────────────────────────────────────────────────

fn tagged(event: AgentEvent) -> ChannelEvent {
    ChannelEvent {
        channel_key: "ops".into(),
        event,
    }
}

#[test]
fn visible_events_render_one_line() {
    let activity = tagged(AgentEvent::Activity {
        call_id: "c".into(),
        activity: describe("bash", &json!({ "command": "make" })),
    });
    assert_eq!(format_event(&activity).unwrap(), "[ops] ⚙ Running `make`");

    let failed = tagged(AgentEvent::ToolResult {
        call_id: "c".into(),
        tool_name: "bash".into(),
        text: "exit 2\nmore".into(),
        outcome: ToolOutcome::Failed,
    });
    assert_eq!(format_event(&failed).unwrap(), "[ops] ✗ bash: exit 2");

    let ended = tagged(AgentEvent::SessionTerminated {
        reason: "agent exited".into(),
    });
    assert!(format_event(&ended).unwrap().contains("session ended: agent exited"));
}

#[test]
fn streamed_events_are_hidden() {
    for event in [
        AgentEvent::TextChunk { text: "x".into() },
        AgentEvent::ReasoningChunk { text: "x".into() },
        AgentEvent::ActivityEnd { call_id: "c".into() },
        AgentEvent::ToolResult {
            call_id: "c".into(),
            tool_name: "bash".into(),
            text: "ok".into(),
            outcome: ToolOutcome::Completed,
        },
    ] {
        assert!(format_event(&tagged(event)).is_none());
    }
}
