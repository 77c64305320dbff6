//! Pulls a JSON payload out of free-form assistant text.
//!
//! Tried in order:
//! 1. the whole (trimmed) text,
//! 2. the content of each fenced code block,
//! 3. the span from the first `{` to the last `}`.
//!
//! Step 3 can select the wrong span when the prose contains several brace
//! fragments; it is a best-effort heuristic.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap())
}

/// First JSON value the ladder accepts, or `None`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for caps in fence_re().captures_iter(trimmed) {
        if let Some(body) = caps.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
                return Some(value);
            }
        }
    }

    brace_span(trimmed).and_then(|span| serde_json::from_str(span).ok())
}

/// `text[first '{' ..= last '}']`, when both exist in that order.
pub fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
