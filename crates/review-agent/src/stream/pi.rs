//! `pi --mode json`: agent / turn / message events with incremental text
//! deltas. The only format whose line parser keeps state between lines.

use serde::Deserialize;
use serde_json::Value;

use super::{text_event, tool_event, LineContext, LineParser};
use crate::types::NormalizedStreamEvent;

/// Buffered delta text is emitted once it reaches this many characters.
pub const PREVIEW_THRESHOLD: usize = 80;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PiEvent {
    AgentStart,
    TurnStart,
    MessageStart,
    MessageUpdate {
        #[serde(rename = "assistantMessageEvent", default)]
        assistant_message_event: Option<PiMessageDelta>,
    },
    MessageEnd {
        message: PiMessage,
    },
    ToolExecutionStart {
        #[serde(rename = "toolName", default)]
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    ToolExecutionEnd,
    TurnEnd,
    AgentEnd,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PiMessageDelta {
    TextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PiMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<PiContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PiContent {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "toolCall")]
    ToolCall {
        #[serde(default)]
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Default)]
pub struct PiLineParser {
    buffer: String,
}

impl LineParser for PiLineParser {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        let event = serde_json::from_str::<PiEvent>(line).ok()?;
        match event {
            PiEvent::MessageUpdate {
                assistant_message_event: Some(PiMessageDelta::TextDelta { delta }),
            } => {
                self.buffer.push_str(&delta);
                if self.buffer.chars().count() < PREVIEW_THRESHOLD {
                    return None;
                }
                let text = std::mem::take(&mut self.buffer);
                text_event(&text, ctx)
            }
            PiEvent::MessageUpdate { .. } | PiEvent::Other => None,
            PiEvent::ToolExecutionStart { tool_name, args } => {
                self.buffer.clear();
                tool_event(&tool_name, &args, ctx)
            }
            PiEvent::MessageEnd { .. } => {
                // The full message text reaches extraction through the
                // transcript; a short unflushed tail is not previewed.
                self.buffer.clear();
                None
            }
            _ => {
                // Any other event is a boundary: drop the partial fragment.
                self.buffer.clear();
                None
            }
        }
    }

    fn finish(&mut self, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        let text = std::mem::take(&mut self.buffer);
        text_event(&text, ctx)
    }
}
