//! Live-progress side channel.
//!
//! [`StreamNormalizer`] turns raw stdout chunks into [`NormalizedStreamEvent`]s
//! through one [`LineParser`] per output format. Everything here is best
//! effort: malformed lines are dropped and the authoritative result is always
//! parsed from the full buffer by [`crate::response`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::types::{NormalizedStreamEvent, OutputFormat};

pub mod claude;
pub mod codex;
pub mod gemini;
pub mod pi;
pub mod plain;

/// Maximum length, in characters, of an emitted event's text.
pub const MAX_EVENT_CHARS: usize = 200;

// ─── LineParser ───────────────────────────────────────────────────────────

/// Per-line context shared with every parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineContext<'a> {
    pub cwd: Option<&'a Path>,
}

/// Turns one complete stdout line into at most one progress event.
pub trait LineParser: Send {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent>;

    /// Called once at end of stream so stateful parsers can emit what they
    /// still hold.
    fn finish(&mut self, _ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        None
    }
}

pub fn parser_for(format: OutputFormat) -> Box<dyn LineParser> {
    match format {
        OutputFormat::ClaudeStream => Box::new(claude::ClaudeLineParser),
        OutputFormat::CodexJson => Box::new(codex::CodexLineParser),
        OutputFormat::GeminiStream => Box::new(gemini::GeminiLineParser),
        OutputFormat::PiJson => Box::new(pi::PiLineParser::default()),
        OutputFormat::PlainText => Box::new(plain::PlainLineParser),
    }
}

// ─── StreamNormalizer ─────────────────────────────────────────────────────

/// Stateful line splitter in front of a [`LineParser`].
///
/// Splitting a stream into chunks at arbitrary points never changes the
/// events produced, as long as every chunk is fed in order and `flush` is
/// called once at the end.
pub struct StreamNormalizer {
    parser: Box<dyn LineParser>,
    pending: String,
    cwd: Option<PathBuf>,
}

impl StreamNormalizer {
    pub fn new(format: OutputFormat, cwd: Option<PathBuf>) -> Self {
        Self::with_parser(parser_for(format), cwd)
    }

    pub fn with_parser(parser: Box<dyn LineParser>, cwd: Option<PathBuf>) -> Self {
        Self {
            parser,
            pending: String::new(),
            cwd,
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<NormalizedStreamEvent> {
        self.pending.push_str(chunk);
        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        let ctx = LineContext {
            cwd: self.cwd.as_deref(),
        };
        complete
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| self.parser.parse_line(line, &ctx))
            .collect()
    }

    pub fn flush(&mut self) -> Vec<NormalizedStreamEvent> {
        let ctx = LineContext {
            cwd: self.cwd.as_deref(),
        };
        let tail = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        if !tail.trim().is_empty() {
            events.extend(self.parser.parse_line(tail.trim_end_matches('\r'), &ctx));
        }
        events.extend(self.parser.finish(&ctx));
        events
    }
}

// ─── Text helpers ─────────────────────────────────────────────────────────

/// Collapse whitespace, relativize paths under `cwd`, and truncate.
/// Returns `None` when nothing displayable is left.
pub fn display_text(text: &str, ctx: &LineContext<'_>) -> Option<String> {
    let collapsed = collapse_whitespace(text);
    if collapsed.is_empty() {
        return None;
    }
    let relative = match ctx.cwd {
        Some(cwd) => relativize_paths(&collapsed, cwd),
        None => collapsed,
    };
    Some(truncate(&relative, MAX_EVENT_CHARS))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to at most `max` characters, ending in `…` when anything was dropped.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

/// Rewrite absolute paths under `cwd` as paths relative to it.
///
/// Only a root that opens a path token is rewritten, so `/srv/app/x` is left
/// alone when `cwd` is `/app`.
pub fn relativize_paths(text: &str, cwd: &Path) -> String {
    let root = cwd.to_string_lossy();
    let root = root.trim_end_matches(['/', '\\']);
    if root.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for (idx, _) in text.match_indices(root) {
        if idx < copied {
            continue;
        }
        let opens_token = text[..idx].chars().next_back().map_or(true, opens_path);
        if !opens_token {
            continue;
        }
        let end = idx + root.len();
        match text[end..].chars().next() {
            Some('/') => {
                out.push_str(&text[copied..idx]);
                copied = end + 1;
            }
            // A bare reference to the root itself becomes `.`.
            None => {
                out.push_str(&text[copied..idx]);
                out.push('.');
                copied = end;
            }
            Some(c) if closes_path(c) => {
                out.push_str(&text[copied..idx]);
                out.push('.');
                copied = end;
            }
            Some(_) => {}
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn opens_path(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '(' | '=')
}

fn closes_path(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '`' | ')' | ',' | ':')
}

/// Argument keys tried, in order, to find the most informative tool target.
const TARGET_KEYS: &[&str] = &[
    "file_path",
    "path",
    "filePath",
    "notebook_path",
    "command",
    "cmd",
    "pattern",
    "query",
    "url",
    "description",
];

/// `"<Tool> <target>"`, or just the tool name when no target is found.
pub fn describe_tool(name: &str, input: &Value) -> String {
    let target = TARGET_KEYS.iter().find_map(|key| match input.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Array(parts)) if !parts.is_empty() => Some(
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    });
    match target {
        Some(t) => format!("{name} {t}"),
        None => name.to_string(),
    }
}

/// Build a `tool_use` event with display cleanup applied.
pub(crate) fn tool_event(name: &str, input: &Value, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
    display_text(&describe_tool(name, input), ctx).map(NormalizedStreamEvent::tool_use)
}

pub(crate) fn text_event(text: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
    display_text(text, ctx).map(NormalizedStreamEvent::assistant_text)
}

// ─── Tests ────────────────────────────────────────────────────────────────
