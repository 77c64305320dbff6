//! `gemini --output-format stream-json`.

use serde::Deserialize;
use serde_json::Value;

use super::{text_event, tool_event, LineContext, LineParser};
use crate::types::NormalizedStreamEvent;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeminiEvent {
    Init,
    Message {
        #[serde(default)]
        role: String,
        #[serde(default)]
        content: String,
        /// Assistant text arrives as deltas to be concatenated.
        #[serde(default)]
        delta: bool,
    },
    ToolUse {
        #[serde(default)]
        tool_name: String,
        #[serde(default)]
        parameters: Value,
    },
    ToolResult {},
    Error {
        #[serde(default)]
        message: String,
    },
    Result {
        #[serde(default)]
        status: String,
    },
    #[serde(other)]
    Other,
}

impl GeminiEvent {
    pub fn assistant_text(&self) -> Option<&str> {
        match self {
            GeminiEvent::Message { role, content, .. } if role == "assistant" => Some(content),
            _ => None,
        }
    }
}

/// `read_file` → `ReadFile`.
pub(crate) fn display_tool_name(raw: &str) -> String {
    raw.split(['_', '-'])
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub struct GeminiLineParser;

impl LineParser for GeminiLineParser {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        let event = serde_json::from_str::<GeminiEvent>(line).ok()?;
        match &event {
            GeminiEvent::ToolUse {
                tool_name,
                parameters,
            } => tool_event(&display_tool_name(tool_name), parameters, ctx),
            _ => event.assistant_text().and_then(|t| text_event(t, ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamEventKind;

    fn parse(line: &str) -> Option<NormalizedStreamEvent> {
        GeminiLineParser.parse_line(line, &LineContext::default())
    }

    #[test]
    fn user_echo_and_init_are_suppressed() {
        assert!(parse(r#"{"type":"init","session_id":"s","model":"gemini-2.5-pro"}"#).is_none());
        assert!(parse(r#"{"type":"message","role":"user","content":"review this"}"#).is_none());
        assert!(parse(r#"{"type":"tool_result","tool_id":"t","status":"success","output":"..."}"#).is_none());
    }

    #[test]
    fn tool_use_uses_display_name() {
        let ev = parse(
            r#"{"type":"tool_use","tool_name":"read_file","tool_id":"t","parameters":{"absolute_path":"/x","file_path":"src/a.rs"}}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, StreamEventKind::ToolUse);
        assert_eq!(ev.text, "ReadFile src/a.rs");
    }

    #[test]
    fn assistant_delta_is_text() {
        let ev = parse(r#"{"type":"message","role":"assistant","content":"Looks good","delta":true}"#)
            .unwrap();
        assert_eq!(ev.kind, StreamEventKind::AssistantText);
        assert_eq!(ev.text, "Looks good");
    }
}
