/// Whole-transcript tests over representative stdout captured from each
/// provider CLI: the live stream and the final parse must agree, and noise
/// must never change the extracted payload.
#[cfg(test)]
mod fixtures {
    use serde_json::{json, Value};

    use crate::response::parse_response;
    use crate::stream::StreamNormalizer;
    use crate::types::{OutputFormat, StreamEventKind};

    const CLAUDE: &str = r#"{"type":"system","subtype":"init","session_id":"9f1","model":"claude-opus-4-1","tools":["Read","Grep"],"mcp_servers":[],"permission_mode":"default","claude_code_version":"2.0.14","cwd":"/work/app"}
{"type":"assistant","message":{"id":"m1","role":"assistant","model":"claude-opus-4-1","content":[{"type":"text","text":"I'll start by reading the changed file."}],"usage":{"input_tokens":10,"output_tokens":5}},"parent_tool_use_id":null,"session_id":"9f1"}
{"type":"assistant","message":{"id":"m1","role":"assistant","model":"claude-opus-4-1","content":[{"type":"tool_use","id":"tu_1","name":"Read","input":{"file_path":"/work/app/src/auth.rs"}}],"usage":{"input_tokens":10,"output_tokens":5}},"parent_tool_use_id":null,"session_id":"9f1"}
{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu_1","content":[{"type":"text","text":"fn check(t: &str) -> bool { t == \"secret\" }"}]}]},"parent_tool_use_id":null,"session_id":"9f1"}
{"type":"assistant","message":{"id":"m2","role":"assistant","model":"claude-opus-4-1","content":[{"type":"text","text":"```json\n{\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}\n```"}],"usage":{"input_tokens":10,"output_tokens":5}},"parent_tool_use_id":null,"session_id":"9f1"}
{"type":"result","subtype":"success","session_id":"9f1","result":"```json\n{\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}\n```","duration_ms":5123,"duration_api_ms":4800,"is_error":false,"num_turns":2,"stop_reason":"end_turn","total_cost_usd":0.031,"usage":{"input_tokens":1200,"output_tokens":90}}
"#;

    const CURSOR: &str = r#"{"type":"system","subtype":"init","apiKeySource":"login","cwd":"/work/app","session_id":"c1","model":"Auto","permissionMode":"default"}
{"type":"user","message":{"role":"user","content":[{"type":"text","text":"Review the diff"}]},"session_id":"c1"}
{"type":"tool_call","subtype":"started","call_id":"call_1","tool_call":{"grepToolCall":{"args":{"pattern":"TODO","path":"/work/app/src"}}},"session_id":"c1"}
{"type":"tool_call","subtype":"completed","call_id":"call_1","tool_call":{"grepToolCall":{"args":{"pattern":"TODO"},"result":{"success":{}}}},"session_id":"c1"}
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"{\"findings\":[]}"}]},"session_id":"c1"}
{"type":"result","subtype":"success","duration_ms":2100,"is_error":false,"result":"{\"findings\":[]}","session_id":"c1"}
"#;

    const CODEX: &str = r#"{"type":"thread.started","thread_id":"0199"}
{"type":"turn.started"}
{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"**Inspecting the diff**"}}
{"type":"item.started","item":{"id":"item_1","type":"command_execution","command":"bash -lc 'git diff --stat'","aggregated_output":"","exit_code":null,"status":"in_progress"}}
{"type":"item.completed","item":{"id":"item_1","type":"command_execution","command":"bash -lc 'git diff --stat'","aggregated_output":" src/auth.rs | 2 +-\n","exit_code":0,"status":"completed"}}
{"type":"item.completed","item":{"id":"item_2","type":"agent_message","text":"Here is the review:\n{\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}"}}
{"type":"turn.completed","usage":{"input_tokens":2200,"cached_input_tokens":0,"output_tokens":120}}
"#;

    const GEMINI: &str = r#"{"type":"init","timestamp":"2025-10-10T12:00:00.000Z","session_id":"g1","model":"gemini-2.5-pro"}
{"type":"message","timestamp":"2025-10-10T12:00:00.010Z","role":"user","content":"Review the diff"}
{"type":"tool_use","timestamp":"2025-10-10T12:00:01.000Z","tool_name":"read_file","tool_id":"read_file-1","parameters":{"absolute_path":"/work/app/src/auth.rs"}}
{"type":"tool_result","timestamp":"2025-10-10T12:00:01.100Z","tool_id":"read_file-1","status":"success","output":""}
{"type":"message","timestamp":"2025-10-10T12:00:02.000Z","role":"assistant","content":"{\"findings\":[{\"file\":\"src/auth.rs\",","delta":true}
{"type":"message","timestamp":"2025-10-10T12:00:02.100Z","role":"assistant","content":"\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}","delta":true}
{"type":"result","timestamp":"2025-10-10T12:00:02.200Z","status":"success","stats":{"total_tokens":900,"duration_ms":2200,"tool_calls":1}}
"#;

    const PI: &str = r#"{"type":"agent_start"}
{"type":"turn_start"}
{"type":"message_start","message":{"role":"assistant","content":[]}}
{"type":"message_update","message":{"role":"assistant"},"assistantMessageEvent":{"type":"text_delta","delta":"Let me check the authentication module for hard-coded values before writing the review."}}
{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"Let me check the authentication module for hard-coded values before writing the review."},{"type":"toolCall","id":"tc1","name":"read","arguments":{"path":"/work/app/src/auth.rs"}}]}}
{"type":"tool_execution_start","toolCallId":"tc1","toolName":"read","args":{"path":"/work/app/src/auth.rs"}}
{"type":"tool_execution_end","toolCallId":"tc1","toolName":"read","result":{"content":[{"type":"text","text":"fn check() {}"}]},"isError":false}
{"type":"turn_end","message":{},"toolResults":[]}
{"type":"turn_start"}
{"type":"message_update","message":{"role":"assistant"},"assistantMessageEvent":{"type":"text_delta","delta":"{\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,"}}
{"type":"message_update","message":{"role":"assistant"},"assistantMessageEvent":{"type":"text_delta","delta":"\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}"}}
{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"{\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]}"}]}}
{"type":"turn_end","message":{},"toolResults":[]}
{"type":"agent_end","messages":[]}
"#;

    fn credential_finding() -> Value {
        json!({"findings": [{
            "file": "src/auth.rs",
            "line": 1,
            "severity": "high",
            "message": "Hard-coded credential"
        }]})
    }

    fn all() -> [(OutputFormat, &'static str, Value); 5] {
        [
            (OutputFormat::ClaudeStream, CLAUDE, credential_finding()),
            (OutputFormat::ClaudeStream, CURSOR, json!({"findings": []})),
            (OutputFormat::CodexJson, CODEX, credential_finding()),
            (OutputFormat::GeminiStream, GEMINI, credential_finding()),
            (OutputFormat::PiJson, PI, credential_finding()),
        ]
    }

    fn with_garbage(raw: &str) -> String {
        let mut out = String::from("Warning: telemetry disabled\n");
        for line in raw.lines() {
            out.push_str(line);
            out.push_str("\n{\"truncated\": \n\u{1b}[2K\n");
        }
        out
    }

    fn events(format: OutputFormat, raw: &str) -> Vec<(StreamEventKind, String)> {
        let mut n = StreamNormalizer::new(format, Some("/work/app".into()));
        let mut out = n.feed(raw);
        out.extend(n.flush());
        out.into_iter().map(|e| (e.kind, e.text)).collect()
    }

    #[test]
    fn every_fixture_extracts_its_payload() {
        for (format, raw, expected) in all() {
            let r = parse_response(format, raw);
            assert!(r.success, "{format:?}: {:?}", r.error);
            assert_eq!(r.data, Some(expected), "{format:?}");
        }
    }

    #[test]
    fn garbage_lines_do_not_change_extraction() {
        for (format, raw, _) in all() {
            assert_eq!(
                parse_response(format, &with_garbage(raw)),
                parse_response(format, raw),
                "{format:?}"
            );
        }
    }

    #[test]
    fn garbage_lines_do_not_change_progress_events() {
        for (format, raw, _) in all() {
            assert_eq!(events(format, &with_garbage(raw)), events(format, raw), "{format:?}");
        }
    }

    #[test]
    fn progress_events_are_relative_and_bounded() {
        for (format, raw, _) in all() {
            let evs = events(format, raw);
            assert!(!evs.is_empty(), "{format:?}");
            for (_, text) in &evs {
                assert!(!text.contains("/work/app/"), "{format:?}: {text}");
                assert!(text.chars().count() <= 200, "{format:?}: {text}");
            }
        }
    }

    #[test]
    fn claude_progress_sequence() {
        assert_eq!(
            events(OutputFormat::ClaudeStream, CLAUDE),
            vec![
                (
                    StreamEventKind::AssistantText,
                    "I'll start by reading the changed file.".to_string()
                ),
                (StreamEventKind::ToolUse, "Read src/auth.rs".to_string()),
                (
                    StreamEventKind::AssistantText,
                    "```json {\"findings\":[{\"file\":\"src/auth.rs\",\"line\":1,\"severity\":\"high\",\"message\":\"Hard-coded credential\"}]} ```".to_string()
                ),
            ]
        );
    }

    #[test]
    fn cursor_tool_call_is_reported_once() {
        let evs = events(OutputFormat::ClaudeStream, CURSOR);
        let tools: Vec<_> = evs
            .iter()
            .filter(|(k, _)| *k == StreamEventKind::ToolUse)
            .collect();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].1, "Grep src");
    }

    #[test]
    fn pi_progress_prefers_tool_over_partial_text() {
        let evs = events(OutputFormat::PiJson, PI);
        assert_eq!(evs[0].0, StreamEventKind::AssistantText);
        assert_eq!(evs[1], (StreamEventKind::ToolUse, "read src/auth.rs".to_string()));
        assert_eq!(evs.last().map(|e| e.0), Some(StreamEventKind::AssistantText));
    }

    #[test]
    fn payload_survives_fenced_and_unfenced_assistant_text() {
        let payload = json!({
            "summary": "one issue",
            "findings": [{"file": "a.rs", "line": 2, "message": "use of `{}` in format"}]
        });
        let body = serde_json::to_string_pretty(&payload).unwrap();
        for text in [
            body.clone(),
            format!("```json\n{body}\n```"),
            format!("Review below.\n\n```\n{body}\n```\nThanks!"),
            format!("Final answer: {body}"),
        ] {
            let line = json!({
                "type": "assistant",
                "message": {"content": [{"type": "text", "text": text}]}
            })
            .to_string();
            let r = parse_response(OutputFormat::ClaudeStream, &line);
            assert_eq!(r.data.as_ref(), Some(&payload), "{text}");
        }
    }
}
