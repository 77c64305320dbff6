//! `codex exec --json`: thread / turn / item events, one per line.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{text_event, tool_event, LineContext, LineParser};
use crate::types::NormalizedStreamEvent;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum CodexEvent {
    #[serde(rename = "item.started")]
    ItemStarted { item: CodexItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: CodexItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "turn.completed")]
    TurnCompleted,
    #[serde(rename = "turn.failed")]
    TurnFailed {
        #[serde(default)]
        error: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodexItem {
    #[serde(alias = "assistant_message")]
    AgentMessage {
        #[serde(default)]
        text: String,
    },
    CommandExecution {
        #[serde(default)]
        command: String,
    },
    FileChange {
        #[serde(default)]
        changes: Vec<FileChange>,
    },
    McpToolCall {
        #[serde(default)]
        server: String,
        #[serde(default)]
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
    WebSearch {
        #[serde(default)]
        query: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl CodexItem {
    /// Tool-like items: anything the agent did rather than said.
    pub fn is_tool(&self) -> bool {
        matches!(
            self,
            CodexItem::CommandExecution { .. }
                | CodexItem::FileChange { .. }
                | CodexItem::McpToolCall { .. }
                | CodexItem::WebSearch { .. }
        )
    }

    fn tool_event(&self, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        match self {
            CodexItem::CommandExecution { command } => {
                tool_event("Shell", &json!({ "command": command }), ctx)
            }
            CodexItem::FileChange { changes } => {
                let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
                tool_event("Edit", &json!({ "path": paths.join(" ") }), ctx)
            }
            CodexItem::McpToolCall {
                server,
                tool,
                arguments,
            } => tool_event(&format!("{server}.{tool}"), arguments, ctx),
            CodexItem::WebSearch { query } => tool_event("WebSearch", &json!({ "query": query }), ctx),
            _ => None,
        }
    }
}

pub struct CodexLineParser;

impl LineParser for CodexLineParser {
    fn parse_line(&mut self, line: &str, ctx: &LineContext<'_>) -> Option<NormalizedStreamEvent> {
        match serde_json::from_str::<CodexEvent>(line).ok()? {
            // Commands report on start; completion only echoes their output.
            CodexEvent::ItemStarted { item } if item.is_tool() => item.tool_event(ctx),
            CodexEvent::ItemCompleted { item } => match &item {
                CodexItem::AgentMessage { text } => text_event(text, ctx),
                CodexItem::FileChange { .. } => item.tool_event(ctx),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamEventKind;

    fn parse(line: &str) -> Option<NormalizedStreamEvent> {
        CodexLineParser.parse_line(line, &LineContext::default())
    }

    #[test]
    fn command_start_is_tool_use_and_completion_is_silent() {
        let ev = parse(
            r#"{"type":"item.started","item":{"id":"item_1","type":"command_execution","command":"bash -lc 'git diff HEAD~1'","status":"in_progress"}}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, StreamEventKind::ToolUse);
        assert_eq!(ev.text, "Shell bash -lc 'git diff HEAD~1'");

        assert!(parse(
            r#"{"type":"item.completed","item":{"id":"item_1","type":"command_execution","command":"ls","aggregated_output":"a\nb","exit_code":0,"status":"completed"}}"#
        )
        .is_none());
    }

    #[test]
    fn agent_message_is_assistant_text() {
        let ev = parse(
            r#"{"type":"item.completed","item":{"id":"item_2","type":"agent_message","text":"No issues found."}}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, StreamEventKind::AssistantText);
        assert_eq!(ev.text, "No issues found.");
    }

    #[test]
    fn lifecycle_and_reasoning_are_suppressed() {
        for line in [
            r#"{"type":"thread.started","thread_id":"t"}"#,
            r#"{"type":"turn.started"}"#,
            r#"{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"**Planning**"}}"#,
            r#"{"type":"turn.completed","usage":{"input_tokens":1,"output_tokens":2}}"#,
        ] {
            assert!(parse(line).is_none(), "{line}");
        }
    }

    #[test]
    fn file_change_lists_paths() {
        let ev = parse(
            r#"{"type":"item.completed","item":{"id":"i","type":"file_change","changes":[{"path":"src/a.rs","kind":"update"}],"status":"completed"}}"#,
        )
        .unwrap();
        assert_eq!(ev.text, "Edit src/a.rs");
    }
}
