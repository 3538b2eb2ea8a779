//! One-line descriptions of tool calls.
//!
//! A tool name is normalised (lowercased, separators folded to `_`, any
//! `server/` or `server__` prefix dropped), then resolved to a [`ToolKind`]
//! by exact lookup, then by an ordered most-specific-first substring table,
//! and finally by the [`ToolKind::Other`] default arm. The raw name always
//! travels with the description.

use serde_json::Value;

/// Longest detail (command, path, query) shown before truncation.
const MAX_DETAIL_CHARS: usize = 80;

/// Display form of a running tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Human-readable one-liner, e.g. "Running `cargo test`".
    pub description: String,
    /// Tool name exactly as the agent reported it.
    pub tool_name: String,
}

/// Family a tool belongs to, for description purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Shell command execution.
    Shell,
    /// Reading a file.
    Read,
    /// Creating a new file.
    Create,
    /// Editing an existing file.
    Edit,
    /// Deleting a file.
    Delete,
    /// Searching file contents.
    Search,
    /// Listing or globbing paths.
    List,
    /// Searching the web.
    WebSearch,
    /// Fetching a URL.
    Fetch,
    /// Delegating to a sub-agent.
    Delegate,
    /// Planning or todo bookkeeping.
    Plan,
    /// Internal reasoning.
    Think,
    /// Anything else.
    Other,
}

const EXACT: &[(&str, ToolKind)] = &[
    ("bash", ToolKind::Shell),
    ("shell", ToolKind::Shell),
    ("execute", ToolKind::Shell),
    ("powershell", ToolKind::Shell),
    ("run_command", ToolKind::Shell),
    ("view", ToolKind::Read),
    ("read", ToolKind::Read),
    ("cat", ToolKind::Read),
    ("create", ToolKind::Create),
    ("write", ToolKind::Create),
    ("edit", ToolKind::Edit),
    ("str_replace", ToolKind::Edit),
    ("delete", ToolKind::Delete),
    ("grep", ToolKind::Search),
    ("rg", ToolKind::Search),
    ("search", ToolKind::Search),
    ("glob", ToolKind::List),
    ("ls", ToolKind::List),
    ("fetch", ToolKind::Fetch),
    ("task", ToolKind::Delegate),
    ("think", ToolKind::Think),
];

// Order matters: earlier entries are more specific than later ones.
const PATTERNS: &[(&str, ToolKind)] = &[
    ("web_search", ToolKind::WebSearch),
    ("web_fetch", ToolKind::Fetch),
    ("fetch_url", ToolKind::Fetch),
    ("todo", ToolKind::Plan),
    ("plan", ToolKind::Plan),
    ("read_file", ToolKind::Read),
    ("read_text", ToolKind::Read),
    ("write_file", ToolKind::Create),
    ("create_file", ToolKind::Create),
    ("str_replace", ToolKind::Edit),
    ("edit", ToolKind::Edit),
    ("delete", ToolKind::Delete),
    ("remove_file", ToolKind::Delete),
    ("list_dir", ToolKind::List),
    ("list_files", ToolKind::List),
    ("glob", ToolKind::List),
    ("grep", ToolKind::Search),
    ("search", ToolKind::Search),
    ("bash", ToolKind::Shell),
    ("shell", ToolKind::Shell),
    ("command", ToolKind::Shell),
    ("exec", ToolKind::Shell),
    ("agent", ToolKind::Delegate),
    ("think", ToolKind::Think),
];

/// Normalise a tool name for lookup.
#[must_use]
pub fn normalize_tool_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let base = lowered
        .rsplit_once("__")
        .map(|(_, tail)| tail)
        .or_else(|| lowered.rsplit_once('/').map(|(_, tail)| tail))
        .unwrap_or(&lowered);
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Resolve a tool name to its [`ToolKind`].
#[must_use]
pub fn classify(name: &str) -> ToolKind {
    let normalized = normalize_tool_name(name);
    if let Some((_, kind)) = EXACT.iter().find(|(key, _)| *key == normalized) {
        return *kind;
    }
    PATTERNS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map_or(ToolKind::Other, |(_, kind)| *kind)
}

/// Describe a tool call with the given arguments.
#[must_use]
pub fn describe(tool_name: &str, args: &Value) -> Activity {
    let kind = classify(tool_name);

    let description = match kind {
        ToolKind::Shell => detail_of(args, &["command", "cmd", "script"])
            .map_or_else(|| "Running a command".to_owned(), |c| format!("Running `{c}`")),
        ToolKind::Read => with_detail("Reading", detail_of(args, PATH_KEYS), "a file"),
        ToolKind::Create => with_detail("Creating", detail_of(args, PATH_KEYS), "a file"),
        ToolKind::Edit => with_detail("Editing", detail_of(args, PATH_KEYS), "a file"),
        ToolKind::Delete => with_detail("Deleting", detail_of(args, PATH_KEYS), "a file"),
        ToolKind::Search => detail_of(args, &["pattern", "query", "regex"]).map_or_else(
            || "Searching files".to_owned(),
            |p| format!("Searching for `{p}`"),
        ),
        ToolKind::List => with_detail("Listing", detail_of(args, &["pattern", "path", "dir"]), "files"),
        ToolKind::WebSearch => detail_of(args, &["query", "q"]).map_or_else(
            || "Searching the web".to_owned(),
            |q| format!("Searching the web for \"{q}\""),
        ),
        ToolKind::Fetch => with_detail("Fetching", detail_of(args, &["url", "uri"]), "a page"),
        ToolKind::Delegate => detail_of(args, &["description", "prompt", "task"]).map_or_else(
            || "Delegating to a sub-agent".to_owned(),
            |d| format!("Delegating: {d}"),
        ),
        ToolKind::Plan => "Updating the plan".to_owned(),
        ToolKind::Think => "Thinking".to_owned(),
        ToolKind::Other => format!("Executing {tool_name}"),
    };

    Activity {
        description,
        tool_name: tool_name.to_owned(),
    }
}

const PATH_KEYS: &[&str] = &["path", "file_path", "filePath", "filename", "file"];

fn with_detail(verb: &str, detail: Option<String>, fallback: &str) -> String {
    match detail {
        Some(d) => format!("{verb} {d}"),
        None => format!("{verb} {fallback}"),
    }
}

fn detail_of(args: &Value, keys: &[&str]) -> Option<String> {
    first_string(args, keys).map(|s| truncate(&s))
}

fn first_string(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| args.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(items) if !items.is_empty() => Some(
                items
                    .iter()
                    .map(|i| i.as_str().map_or_else(|| i.to_string(), str::to_owned))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        })
}

fn truncate(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    let multi_line = text.trim().lines().nth(1).is_some();
    if first_line.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = first_line.chars().take(MAX_DETAIL_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    } else if multi_line {
        format!("{first_line} …")
    } else {
        first_line.to_owned()
    }
}
