//! Final-output parsing: from a provider's full captured stdout to an
//! [`ExtractionResult`].
//!
//! A pre-structured payload (`structured_output`) is authoritative. Otherwise
//! the assistant text is reconstructed per format, keeping only what was said
//! after the most recent tool interaction, and handed to the JSON ladder in
//! [`crate::extract`].

use serde_json::Value;
use tracing::debug;

use crate::extract::extract_json;
use crate::stream::claude::{ClaudeEvent, ContentBlock};
use crate::stream::codex::{CodexEvent, CodexItem};
use crate::stream::gemini::GeminiEvent;
use crate::stream::pi::{PiContent, PiEvent, PiMessageDelta};
use crate::types::{ExtractionResult, OutputFormat};

pub fn parse_response(format: OutputFormat, raw: &str) -> ExtractionResult {
    if raw.trim().is_empty() {
        return ExtractionResult::failed("provider produced no output", None);
    }

    let reply = match format {
        OutputFormat::ClaudeStream => claude_reply(raw),
        OutputFormat::CodexJson => codex_reply(raw),
        OutputFormat::GeminiStream => gemini_reply(raw),
        OutputFormat::PiJson => pi_reply(raw),
        OutputFormat::PlainText => Reply::text(raw.to_string()),
    };
    reply.into_result()
}

/// Run only the JSON ladder over already-extracted text.
pub fn parse_text(text: &str) -> ExtractionResult {
    Reply::text(text.to_string()).into_result()
}

// ─── Reply ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Reply {
    structured: Option<Value>,
    text: String,
}

impl Reply {
    fn text(text: String) -> Self {
        Self {
            structured: None,
            text,
        }
    }

    fn into_result(self) -> ExtractionResult {
        let raw_text = (!self.text.trim().is_empty()).then_some(self.text);
        if let Some(data) = self.structured {
            return ExtractionResult::found(data, raw_text);
        }
        let Some(text) = raw_text else {
            return ExtractionResult::failed("no assistant text in provider output", None);
        };
        match extract_json(&text) {
            Some(data) => ExtractionResult::found(data, Some(text)),
            None => ExtractionResult::failed("no JSON payload found in assistant text", Some(text)),
        }
    }
}

/// Assistant text seen so far, plus the part after the last tool interaction.
#[derive(Debug, Default)]
struct Transcript {
    full: String,
    since_tool: String,
}

impl Transcript {
    /// Append a fragment of the current message verbatim.
    fn push(&mut self, text: &str) {
        self.full.push_str(text);
        self.since_tool.push_str(text);
    }

    /// Append a complete message, separated from earlier text by a newline.
    fn push_message(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for buf in [&mut self.full, &mut self.since_tool] {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(text);
        }
    }

    fn tool(&mut self) {
        self.since_tool.clear();
    }

    fn into_text(self) -> String {
        if self.since_tool.trim().is_empty() {
            self.full
        } else {
            self.since_tool
        }
    }
}

/// An event type whose catch-all variant does not count as recognised output.
trait WireEvent: serde::de::DeserializeOwned {
    fn is_known(&self) -> bool;
}

impl WireEvent for ClaudeEvent {
    fn is_known(&self) -> bool {
        !matches!(self, ClaudeEvent::Unknown)
    }
}

impl WireEvent for CodexEvent {
    fn is_known(&self) -> bool {
        !matches!(self, CodexEvent::Other)
    }
}

impl WireEvent for GeminiEvent {
    fn is_known(&self) -> bool {
        !matches!(self, GeminiEvent::Other)
    }
}

impl WireEvent for PiEvent {
    fn is_known(&self) -> bool {
        !matches!(self, PiEvent::Other)
    }
}

/// Decode newline-delimited events, skipping lines that are not `T`.
///
/// A stdout that is one (possibly pretty-printed) JSON document, or an
/// array of events, is accepted too. Returns `None` when no line was a
/// recognised event, so the caller can treat the output as plain text.
fn decode_events<T: WireEvent>(raw: &str, format: &str) -> Option<Vec<T>> {
    if let Ok(doc) = serde_json::from_str::<Value>(raw.trim()) {
        let items = match doc {
            Value::Array(items) => items,
            other => vec![other],
        };
        let events: Vec<T> = items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<T>(v).ok())
            .filter(WireEvent::is_known)
            .collect();
        return (!events.is_empty()).then_some(events);
    }

    let mut events: Vec<T> = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(ev) if ev.is_known() => events.push(ev),
            Ok(_) => debug!(format, line = idx + 1, "skipping unrecognised event"),
            Err(e) => debug!(format, line = idx + 1, error = %e, "skipping malformed event line"),
        }
    }
    (!events.is_empty()).then_some(events)
}

// ─── Per-format reconstruction ────────────────────────────────────────────

fn claude_reply(raw: &str) -> Reply {
    let Some(events) = decode_events::<ClaudeEvent>(raw, "claude") else {
        return Reply::text(raw.to_string());
    };

    let mut transcript = Transcript::default();
    let mut structured = None;
    let mut result_text = None;

    for event in events {
        match event {
            ClaudeEvent::Assistant(msg) => {
                for block in msg.message.content.blocks() {
                    match block {
                        ContentBlock::Text { text } => transcript.push_message(&text),
                        ContentBlock::ToolUse { .. } => transcript.tool(),
                        _ => {}
                    }
                }
            }
            ClaudeEvent::User(msg) => {
                let echoes_tool = msg
                    .message
                    .content
                    .blocks()
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult {}));
                if echoes_tool {
                    transcript.tool();
                }
            }
            ClaudeEvent::ToolCall(_) => transcript.tool(),
            ClaudeEvent::Result(envelope) => {
                if envelope.is_error {
                    debug!(subtype = ?envelope.subtype, "result envelope reports an error");
                }
                if let Some(data) = envelope.structured_output.clone().filter(|v| !v.is_null()) {
                    structured = Some(data);
                }
                if let Some(text) = envelope.result_text().filter(|t| !t.trim().is_empty()) {
                    result_text = Some(text);
                }
            }
            ClaudeEvent::System | ClaudeEvent::Unknown => {}
        }
    }

    Reply {
        structured,
        text: result_text.unwrap_or_else(|| transcript.into_text()),
    }
}

fn codex_reply(raw: &str) -> Reply {
    let Some(events) = decode_events::<CodexEvent>(raw, "codex") else {
        return Reply::text(raw.to_string());
    };

    let mut transcript = Transcript::default();
    for event in events {
        match event {
            CodexEvent::ItemCompleted {
                item: CodexItem::AgentMessage { text },
            } => transcript.push_message(&text),
            CodexEvent::ItemStarted { item } | CodexEvent::ItemCompleted { item }
                if item.is_tool() =>
            {
                transcript.tool()
            }
            CodexEvent::TurnFailed { error } => debug!(%error, "codex turn failed"),
            _ => {}
        }
    }
    Reply::text(transcript.into_text())
}

fn gemini_reply(raw: &str) -> Reply {
    let Some(events) = decode_events::<GeminiEvent>(raw, "gemini") else {
        return Reply::text(raw.to_string());
    };

    let mut transcript = Transcript::default();
    for event in events {
        match &event {
            GeminiEvent::Message { delta: true, .. } => {
                if let Some(text) = event.assistant_text() {
                    transcript.push(text);
                }
            }
            GeminiEvent::Message { .. } => {
                if let Some(text) = event.assistant_text() {
                    transcript.push_message(text);
                }
            }
            GeminiEvent::ToolUse { .. } | GeminiEvent::ToolResult {} => transcript.tool(),
            GeminiEvent::Error { message } => debug!(%message, "gemini reported an error"),
            _ => {}
        }
    }
    Reply::text(transcript.into_text())
}

fn pi_reply(raw: &str) -> Reply {
    let Some(events) = decode_events::<PiEvent>(raw, "pi") else {
        return Reply::text(raw.to_string());
    };

    let mut transcript = Transcript::default();
    // Deltas of a message that never saw its `message_end`.
    let mut pending = String::new();
    for event in events {
        match event {
            PiEvent::MessageUpdate {
                assistant_message_event: Some(PiMessageDelta::TextDelta { delta }),
            } => pending.push_str(&delta),
            PiEvent::MessageEnd { message } => {
                pending.clear();
                if message.role != "assistant" {
                    continue;
                }
                for content in message.content {
                    match content {
                        PiContent::Text { text } => transcript.push_message(&text),
                        PiContent::ToolCall { .. } => transcript.tool(),
                        PiContent::Other => {}
                    }
                }
            }
            PiEvent::ToolExecutionStart { .. } => {
                pending.clear();
                transcript.tool();
            }
            _ => {}
        }
    }
    transcript.push_message(&pending);
    Reply::text(transcript.into_text())
}
