//! Unit tests for tool-call descriptions.

use serde_json::json;

use agent_switchboard::activity::{classify, describe, normalize_tool_name, ToolKind};

#[test]
fn names_are_normalised() {
    assert_eq!(normalize_tool_name("Bash"), "bash");
    assert_eq!(normalize_tool_name("mcp__github__search-code"), "search_code");
    assert_eq!(normalize_tool_name("fs/read_file"), "read_file");
}

#[test]
fn exact_then_pattern_then_default() {
    assert_eq!(classify("bash"), ToolKind::Shell);
    assert_eq!(classify("str_replace_editor"), ToolKind::Edit);
    assert_eq!(classify("WebSearch"), ToolKind::Search);
    assert_eq!(classify("web_search"), ToolKind::WebSearch);
    assert_eq!(classify("todo_write"), ToolKind::Plan);
    assert_eq!(classify("frobnicate"), ToolKind::Other);
}

/// More specific patterns win over generic ones later in the table.
#[test]
fn specific_patterns_win() {
    assert_eq!(classify("read_file"), ToolKind::Read);
    assert_eq!(classify("web_fetch"), ToolKind::Fetch);
    assert_eq!(classify("search_replace_edit"), ToolKind::Edit);
}

#[test]
fn descriptions_carry_the_detail() {
    assert_eq!(describe("bash", &json!({ "command": "cargo test" })).description, "Running `cargo test`");
    assert_eq!(describe("view", &json!({ "path": "README.md" })).description, "Reading README.md");
    assert_eq!(describe("create", &json!({ "file_path": "a.txt" })).description, "Creating a.txt");
    assert_eq!(describe("grep", &json!({ "pattern": "TODO" })).description, "Searching for `TODO`");
    assert_eq!(
        describe("web_search", &json!({ "query": "tokio select" })).description,
        "Searching the web for \"tokio select\""
    );
    assert_eq!(describe("task", &json!({ "description": "audit deps" })).description, "Delegating: audit deps");
    assert_eq!(describe("todo_write", &json!({})).description, "Updating the plan");
}

#[test]
fn missing_detail_uses_generic_wording() {
    assert_eq!(describe("bash", &json!({})).description, "Running a command");
    assert_eq!(describe("edit", &json!(null)).description, "Editing a file");
}

#[test]
fn unknown_tool_keeps_raw_name() {
    let activity = describe("mcp__jira__create_ticket_v2", &json!({ "summary": "x" }));
    assert_eq!(activity.tool_name, "mcp__jira__create_ticket_v2");
    assert_eq!(activity.description, "Executing mcp__jira__create_ticket_v2");

    let other = describe("Frobnicate", &json!({}));
    assert_eq!(other.description, "Executing Frobnicate");
    assert_eq!(other.tool_name, "Frobnicate");
}

#[test]
fn argv_arrays_are_joined_and_long_commands_truncated() {
    assert_eq!(describe("shell", &json!({ "command": ["git", "status"] })).description, "Running `git status`");

    let long = "x".repeat(300);
    let description = describe("bash", &json!({ "command": long })).description;
    assert!(description.chars().count() < 100);
    assert!(description.contains('…'));
}
