//! `--output-format stream-json` as written by Claude Code and Cursor Agent.
//!
//! Only the fields the normalizer and response parser read are modelled;
//! everything else is ignored so new CLI versions keep parsing.

use serde::Deserialize;
use serde_json::Value;

use super::{text_event, tool_event, LineContext, LineParser};
use crate::types::NormalizedStreamEvent;

// ─── Wire types ───────────────────────────────────────────────────────────

/// One stream-json line, discriminated by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeEvent {
    System,
    Assistant(ChatMessage),
    User(ChatMessage),
    Result(ResultEnvelope),
    /// Cursor Agent reports tool activity as separate `tool_call` events.
    ToolCall(ToolCallEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub message: MessageBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Contents,
}

/// Message content is normally a block list, occasionally a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Blocks(Vec<ContentBlock>),
    Text(String),
}

impl Default for Contents {
    fn default() -> Self {
        Contents::Blocks(Vec::new())
    }
}

impl Contents {
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            Contents::Blocks(blocks) => blocks.clone(),
            Contents::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {},
    #[serde(other)]
    Other,
}

/// `type = "result"`: the terminal envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultEnvelope {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    /// A string for Claude Code; some wrappers send `{content:[...]}`.
    #[serde(default)]
    pub result: Option<Value>,
    /// Present when the CLI was asked for a JSON schema.
    #[serde(default)]
    pub structured_output: Option<Value>,
}

impl ResultEnvelope {
    /// Final text carried by the envelope, whichever shape it came in.
    pub fn result_text(&self) -> Option<String> {
        match self.result.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("content").and_then(blocks_text),
            Value::Array(_) => self.result.as_ref().and_then(blocks_text),
            _ => None,
        }
    }
}

/// Concatenated `text` of a JSON content-block array.
fn blocks_text(value: &Value) -> Option<String> {
    let blocks = value.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then(|| text.join(""))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallEvent {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub tool_call: Value,
}

impl ToolCallEvent {
    pub fn is_started(&self) -> bool {
        self.subtype.as_deref() == Some("started")
    }

    /// `{"readToolCall": {"args": {...}}}` → `("Read", args)`.
    pub fn name_and_args(&self) -> Option<(String, Value)> {
        let (key, body) = self.tool_call.as_object()?.iter().next()?;
        let base = key.strip_suffix("ToolCall").unwrap_or(key);
        let mut chars = base.chars();
        let name = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => return None,
        };
        let args = body.get("args").cloned().unwrap_or(Value::Null);
        Some((name, args))
    }
}

// ─── Line parser ──────────────────────────────────────────────────────────

pub struct ClaudeLineParser;

impl LineParser for ClaudeLineParser {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        match serde_json::from_str::<ClaudeEvent>(line).ok()? {
            ClaudeEvent::Assistant(msg) => {
                let blocks = msg.message.content.blocks();
                // A tool call is more informative than the text leading into it.
                if let Some((name, input)) = blocks.iter().rev().find_map(|b| match b {
                    ContentBlock::ToolUse { name, input } => Some((name, input)),
                    _ => None,
                }) {
                    return tool_event(name, input, ctx);
                }
                let text: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                text_event(&text.join(" "), ctx)
            }
            ClaudeEvent::ToolCall(call) if call.is_started() => {
                let (name, args) = call.name_and_args()?;
                tool_event(&name, &args, ctx)
            }
            _ => None,
        }
    }
}
