//! `session/update` demultiplexer.
//!
//! Turns each update object into zero or more [`AgentEvent`]s and keeps one
//! [`ToolCallRecord`] per live tool call.
//!
//! | `sessionUpdate`                     | Produces                                   |
//! |-------------------------------------|--------------------------------------------|
//! | `agent_message_chunk`               | `TextChunk`                                |
//! | `agent_thought_chunk`               | `ReasoningChunk`                           |
//! | `tool_call`                         | record in `Start` (title only)             |
//! | `tool_call_update` / `in_progress`  | `Activity` once, then `OutputDelta`s       |
//! | `tool_call_update` / `completed`    | `Image`s, one `ToolResult`, `ActivityEnd`  |
//! | `tool_call_update` / `failed`       | one failed `ToolResult`, `ActivityEnd`     |
//! | `current_mode_update`               | `ModeChanged`                              |
//!
//! Once a record is terminal its id is remembered and any later update for
//! it is ignored, so a call never yields a second result.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{json, Value};
use tracing::debug;

use crate::activity;
use crate::events::{AgentEvent, ToolOutcome};

/// Lifecycle position of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Announced, no arguments yet.
    Start,
    /// Running with known arguments.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ToolStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Start),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further updates are accepted.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Image carried by a tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageContent {
    /// MIME type.
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

/// Everything known about one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    /// Agent-assigned call id.
    pub call_id: String,
    /// Raw tool name (or display title until a name is known).
    pub name: String,
    /// Parsed arguments, once an in-progress update supplied them.
    pub raw_args: Option<Value>,
    /// Current status.
    pub status: ToolStatus,
    /// Output accumulated so far.
    pub result_text: String,
    /// Images attached to the result.
    pub images: Vec<ImageContent>,
    activity_emitted: bool,
}

impl ToolCallRecord {
    fn new(call_id: &str, name: String) -> Self {
        Self {
            call_id: call_id.to_owned(),
            name,
            raw_args: None,
            status: ToolStatus::Start,
            result_text: String::new(),
            images: Vec::new(),
            activity_emitted: false,
        }
    }
}

/// Finished call ids remembered per session; the oldest is forgotten first.
pub const MAX_FINISHED_IDS: usize = 1024;

/// Per-session update classifier.
#[derive(Debug, Default)]
pub struct Demultiplexer {
    live: HashMap<String, ToolCallRecord>,
    finished: HashSet<String>,
    finished_order: VecDeque<String>,
}

impl Demultiplexer {
    /// Create an empty demultiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a call that has not yet finished.
    #[must_use]
    pub fn record(&self, call_id: &str) -> Option<&ToolCallRecord> {
        self.live.get(call_id)
    }

    /// Whether `call_id` has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self, call_id: &str) -> bool {
        self.finished.contains(call_id)
    }

    /// Number of calls currently running.
    #[must_use]
    pub fn live_calls(&self) -> usize {
        self.live.len()
    }

    /// Classify one `update` object (the `params.update` of a
    /// `session/update` notification).
    pub fn handle_update(&mut self, update: &Value) -> Vec<AgentEvent> {
        let kind = update
            .get("sessionUpdate")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match kind {
            "agent_message_chunk" => content_text(update)
                .map(|text| vec![AgentEvent::TextChunk { text }])
                .unwrap_or_default(),
            "agent_thought_chunk" => content_text(update)
                .map(|text| vec![AgentEvent::ReasoningChunk { text }])
                .unwrap_or_default(),
            "tool_call" => self.tool_call(update),
            "tool_call_update" => self.tool_call_update(update),
            "current_mode_update" => update
                .get("currentModeId")
                .and_then(Value::as_str)
                .map(|mode| {
                    vec![AgentEvent::ModeChanged {
                        mode: mode.to_owned(),
                    }]
                })
                .unwrap_or_default(),
            other => {
                debug!(update_kind = other, "demux: ignoring session update");
                Vec::new()
            }
        }
    }

    fn tool_call(&mut self, update: &Value) -> Vec<AgentEvent> {
        let Some(call_id) = call_id(update) else {
            return Vec::new();
        };
        if self.finished.contains(call_id) {
            return Vec::new();
        }

        let name = tool_name(update).unwrap_or_else(|| "tool".to_owned());
        self.live
            .entry(call_id.to_owned())
            .or_insert_with(|| ToolCallRecord::new(call_id, name));

        // Some agents announce a call that is already running or done.
        match status(update) {
            Some(ToolStatus::Start) | None => Vec::new(),
            Some(_) => self.tool_call_update(update),
        }
    }

    fn tool_call_update(&mut self, update: &Value) -> Vec<AgentEvent> {
        let Some(call_id) = call_id(update) else {
            return Vec::new();
        };
        if self.finished.contains(call_id) {
            debug!(call_id, "demux: update for finished tool call ignored");
            return Vec::new();
        }

        let record = self.live.entry(call_id.to_owned()).or_insert_with(|| {
            ToolCallRecord::new(
                call_id,
                tool_name(update).unwrap_or_else(|| "tool".to_owned()),
            )
        });
        if let Some(name) = meta_tool_name(update) {
            record.name = name;
        }
        if let Some(args) = update.get("rawInput").filter(|v| !v.is_null()) {
            record.raw_args = Some(parse_args(args));
        }

        let mut events = Vec::new();
        match status(update) {
            Some(ToolStatus::InProgress) => {
                record.status = ToolStatus::InProgress;
                if !record.activity_emitted && record.raw_args.is_some() {
                    events.push(activity_event(record));
                }
                for text in content_texts(update) {
                    record.result_text.push_str(&text);
                    events.push(AgentEvent::OutputDelta {
                        call_id: call_id.to_owned(),
                        text,
                    });
                }
            }
            Some(ToolStatus::Completed) => {
                record.status = ToolStatus::Completed;
                if !record.activity_emitted {
                    events.push(activity_event(record));
                }
                let text = completed_text(update);
                for image in content_images(update) {
                    events.push(AgentEvent::Image {
                        call_id: call_id.to_owned(),
                        mime_type: image.mime_type.clone(),
                        data: image.data.clone(),
                    });
                    record.images.push(image);
                }
                events.push(AgentEvent::ToolResult {
                    call_id: call_id.to_owned(),
                    tool_name: record.name.clone(),
                    text,
                    outcome: ToolOutcome::Completed,
                });
                events.push(AgentEvent::ActivityEnd {
                    call_id: call_id.to_owned(),
                });
            }
            Some(ToolStatus::Failed) => {
                record.status = ToolStatus::Failed;
                if !record.activity_emitted {
                    events.push(activity_event(record));
                }
                events.push(AgentEvent::ToolResult {
                    call_id: call_id.to_owned(),
                    tool_name: record.name.clone(),
                    text: failure_text(update),
                    outcome: ToolOutcome::Failed,
                });
                events.push(AgentEvent::ActivityEnd {
                    call_id: call_id.to_owned(),
                });
            }
            Some(ToolStatus::Start) | None => {}
        }

        if record.status.is_terminal() {
            self.live.remove(call_id);
            self.mark_finished(call_id);
        }
        events
    }

    fn mark_finished(&mut self, call_id: &str) {
        if !self.finished.insert(call_id.to_owned()) {
            return;
        }
        self.finished_order.push_back(call_id.to_owned());
        while self.finished_order.len() > MAX_FINISHED_IDS {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }
}

/// Parse tool arguments, accepting either an object or a JSON string.
///
/// A string that is not valid JSON is wrapped as `{"raw": <string>}`.
#[must_use]
pub fn parse_args(raw: &Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({ "raw": s })),
        other => other.clone(),
    }
}

fn activity_event(record: &mut ToolCallRecord) -> AgentEvent {
    record.activity_emitted = true;
    let args = record.raw_args.clone().unwrap_or(Value::Null);
    AgentEvent::Activity {
        call_id: record.call_id.clone(),
        activity: activity::describe(&record.name, &args),
    }
}

fn call_id(update: &Value) -> Option<&str> {
    update.get("toolCallId").and_then(Value::as_str)
}

fn status(update: &Value) -> Option<ToolStatus> {
    update
        .get("status")
        .and_then(Value::as_str)
        .and_then(ToolStatus::parse)
}

fn meta_tool_name(update: &Value) -> Option<String> {
    update
        .get("_meta")
        .and_then(|meta| meta.get("toolName"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn tool_name(update: &Value) -> Option<String> {
    meta_tool_name(update).or_else(|| {
        ["title", "kind"]
            .iter()
            .find_map(|key| update.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

/// Text of a chunk update's single `content` block.
fn content_text(update: &Value) -> Option<String> {
    update
        .get("content")
        .and_then(block_text)
        .filter(|t| !t.is_empty())
}

/// A content block is either `{type:"text", text}` or the tool-call form
/// `{type:"content", content:{type:"text", text}}`.
fn inner_block(item: &Value) -> &Value {
    match item.get("type").and_then(Value::as_str) {
        Some("content") => item.get("content").unwrap_or(item),
        _ => item,
    }
}

fn block_text(item: &Value) -> Option<String> {
    let block = inner_block(item);
    match block.get("type").and_then(Value::as_str) {
        Some("text") | None => block.get("text").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

fn content_items(update: &Value) -> impl Iterator<Item = &Value> {
    update
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn content_texts(update: &Value) -> Vec<String> {
    content_items(update)
        .filter_map(block_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn content_images(update: &Value) -> Vec<ImageContent> {
    content_items(update)
        .map(inner_block)
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("image"))
        .filter_map(|block| {
            let data = block.get("data").and_then(Value::as_str)?;
            let mime_type = block
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(ImageContent {
                mime_type: mime_type.to_owned(),
                data: data.to_owned(),
            })
        })
        .collect()
}

fn raw_output_text(update: &Value, keys: &[&str]) -> Option<String> {
    let raw = update.get("rawOutput")?;
    if let Some(s) = raw.as_str() {
        return Some(s.to_owned());
    }
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn completed_text(update: &Value) -> String {
    let texts = content_texts(update);
    if texts.is_empty() {
        raw_output_text(update, &["content", "output", "stdout"]).unwrap_or_default()
    } else {
        texts.join("\n")
    }
}

fn failure_text(update: &Value) -> String {
    let texts = content_texts(update);
    if texts.is_empty() {
        raw_output_text(update, &["error", "message"])
            .unwrap_or_else(|| "tool call failed".to_owned())
    } else {
        texts.join("\n")
    }
}
