//! `[[image:PATH]]` markers in agent replies.
//!
//! An agent that wants the connector to upload a file writes a marker in
//! its reply text. Connectors extract the paths, upload them, and show the
//! reply with the markers removed.

use std::sync::OnceLock;

use regex::Regex;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // Literal pattern; covered by tests.
    MARKER.get_or_init(|| Regex::new(r"\[\[image:([^\]\n]+)\]\]").expect("valid marker regex"))
}

/// Paths named by image markers, in order of first appearance, without
/// duplicates. Surrounding whitespace is trimmed from each path.
#[must_use]
pub fn extract_image_markers(text: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in marker_regex().captures_iter(text) {
        let path = caps[1].trim();
        if !path.is_empty() && !paths.iter().any(|p| p == path) {
            paths.push(path.to_owned());
        }
    }
    paths
}

/// `text` with every image marker removed and the result trimmed.
#[must_use]
pub fn strip_image_markers(text: &str) -> String {
    marker_regex().replace_all(text, "").trim().to_owned()
}
