//! Answers `session/request_permission` with a rejection.
//!
//! The client never grants anything. The reply selects the agent's own
//! rejecting option when one is offered, so the agent sees a normal
//! decision, and falls back to the `cancelled` outcome otherwise.

use serde_json::{json, Value};
use tracing::info;

use crate::events::AgentEvent;

/// Option kinds in preference order.
const REJECT_KINDS: [&str; 2] = ["reject_once", "reject_always"];

/// Build the reply to a permission request and the event announcing it.
#[must_use]
pub fn intercept(params: &Value) -> (Value, AgentEvent) {
    let options = params
        .get("options")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let outcome = match choose_reject_option(options) {
        Some(option_id) => json!({ "outcome": { "outcome": "selected", "optionId": option_id } }),
        None => json!({ "outcome": { "outcome": "cancelled" } }),
    };

    let tool_call = params.get("toolCall").unwrap_or(&Value::Null);
    let permission = ["title", "kind"]
        .iter()
        .find_map(|key| tool_call.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_owned();
    let path = requested_path(tool_call);

    let message = match &path {
        Some(path) => format!("Permission denied: {permission} ({path})"),
        None => format!("Permission denied: {permission}"),
    };
    info!(%permission, path = ?path, "permission request rejected");

    (
        outcome,
        AgentEvent::PermissionRejected {
            permission,
            path,
            message,
        },
    )
}

/// Pick the option id to answer with, if any option rejects.
///
/// An option whose kind starts with `allow` is never chosen, whatever its id
/// says.
#[must_use]
pub fn choose_reject_option(options: &[Value]) -> Option<String> {
    let option_id = |opt: &Value| opt.get("optionId").and_then(Value::as_str).map(str::to_owned);
    let kind_of = |opt: &Value| {
        opt.get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    for wanted in REJECT_KINDS {
        if let Some(id) = options
            .iter()
            .filter(|opt| kind_of(opt) == wanted)
            .find_map(option_id)
        {
            return Some(id);
        }
    }

    options
        .iter()
        .filter(|opt| {
            let id = opt
                .get("optionId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            let kind = kind_of(opt).to_lowercase();
            if kind.starts_with("allow") {
                return false;
            }
            [id, kind]
                .iter()
                .any(|s| s.contains("reject") || s.contains("deny"))
        })
        .find_map(option_id)
}

fn requested_path(tool_call: &Value) -> Option<String> {
    let raw_input = tool_call.get("rawInput").map(crate::acp::notifications::parse_args);
    let from_input = raw_input.as_ref().and_then(|input| {
        ["path", "file_path", "filePath"]
            .iter()
            .find_map(|key| input.get(*key).and_then(Value::as_str))
            .map(str::to_owned)
    });

    from_input.or_else(|| {
        tool_call
            .get("locations")
            .and_then(Value::as_array)
            .and_then(|locs| locs.first())
            .and_then(|loc| loc.get("path"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    })
}
