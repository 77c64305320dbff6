use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::process::ProcessHandle;
use crate::Result;

/// Default wall-clock limit for one provider invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ─── Tier ─────────────────────────────────────────────────────────────────

/// Coarse speed/quality classification of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Fast,
    Balanced,
    Thorough,
    Premium,
    Free,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Balanced => "balanced",
            Tier::Thorough => "thorough",
            Tier::Premium => "premium",
            Tier::Free => "free",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── CliModel ─────────────────────────────────────────────────────────────

/// What to pass as the model flag value.
///
/// `Suppress` omits the flag so the external tool picks its own default.
/// `Name("")` is *not* suppression: the empty value is passed through and the
/// tool reports its own validation error.
///
/// In YAML: absent → `Inherit`, `null` → `Suppress`, a string → `Name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CliModel {
    #[default]
    Inherit,
    Suppress,
    Name(String),
}

impl CliModel {
    pub fn is_inherit(&self) -> bool {
        matches!(self, CliModel::Inherit)
    }
}

impl<'de> Deserialize<'de> for CliModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Only reached when the key is present; absence is handled by
        // `#[serde(default)]` on the containing field.
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(name) => CliModel::Name(name),
            None => CliModel::Suppress,
        })
    }
}

impl Serialize for CliModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CliModel::Inherit | CliModel::Suppress => serializer.serialize_none(),
            CliModel::Name(name) => serializer.serialize_str(name),
        }
    }
}

// ─── Definitions ──────────────────────────────────────────────────────────

/// One entry in a provider's built-in model catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDefinition {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    #[serde(skip_serializing_if = "CliModel::is_inherit")]
    pub cli_model: CliModel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub description: String,
}

impl ModelDefinition {
    pub fn new(id: &str, name: &str, tier: Tier) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            tier,
            cli_model: CliModel::Inherit,
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            aliases: Vec::new(),
            description: String::new(),
        }
    }

    pub fn cli_model(mut self, cli_model: CliModel) -> Self {
        self.cli_model = cli_model;
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Exact id or alias match, case-insensitive.
    pub fn matches(&self, model_id: &str) -> bool {
        self.id.eq_ignore_ascii_case(model_id)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(model_id))
    }
}

/// Output dialect a provider CLI writes on stdout. Selects both the live
/// stream parser and the final response parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `--output-format stream-json` (Claude Code, Cursor Agent).
    ClaudeStream,
    /// `codex exec --json` thread/turn/item events.
    CodexJson,
    /// `gemini --output-format stream-json`.
    GeminiStream,
    /// `pi --mode json` agent events with incremental text deltas.
    PiJson,
    /// Unstructured text on stdout.
    PlainText,
}

/// Static description of an external coding-agent CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDefinition {
    pub id: String,
    pub name: String,
    pub command: String,
    /// Environment variable that overrides `command`.
    pub command_env: String,
    pub base_args: Vec<String>,
    /// Appended after everything else (e.g. `-` to read the prompt from stdin).
    pub trailing_args: Vec<String>,
    pub model_flag: String,
    /// Used when the provider config sets `yolo: true`.
    pub bypass_args: Vec<String>,
    /// Used otherwise; keeps the agent read-only.
    pub restricted_args: Vec<String>,
    pub format: OutputFormat,
    pub models: Vec<ModelDefinition>,
    pub default_model: String,
    pub install_instructions: String,
    /// Whether a fast-tier model may be re-invoked to pull JSON out of free text.
    pub supports_extraction: bool,
}

impl ProviderDefinition {
    /// Look up a catalogue entry by id or alias.
    pub fn find_model(&self, model_id: &str) -> Option<&ModelDefinition> {
        self.models
            .iter()
            .find(|m| m.id == model_id)
            .or_else(|| self.models.iter().find(|m| m.matches(model_id)))
    }

    /// The model used for cheap auxiliary work such as JSON extraction.
    pub fn fast_model(&self) -> &str {
        self.models
            .iter()
            .find(|m| m.tier == Tier::Fast)
            .map(|m| m.id.as_str())
            .unwrap_or(&self.default_model)
    }
}

/// Conventional name of the command-override variable: `cursor-agent` →
/// `CURSOR_AGENT_CMD`.
pub fn command_env_var(provider_id: &str) -> String {
    format!("{}_CMD", provider_id.to_ascii_uppercase().replace('-', "_"))
}

// ─── ResolvedInvocation ───────────────────────────────────────────────────

/// The exact process a provider will launch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInvocation {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    use_shell: bool,
    prompt_via_stdin: bool,
}

impl ResolvedInvocation {
    pub(crate) fn new(command: String, args: Vec<String>, env: BTreeMap<String, String>) -> Self {
        let use_shell = command.contains(char::is_whitespace);
        Self {
            command,
            args,
            env,
            use_shell,
            prompt_via_stdin: true,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Commands containing whitespace (`npx foo`, `node /path/cli.js`) run
    /// through the platform shell rather than direct exec.
    pub fn use_shell(&self) -> bool {
        self.use_shell
    }

    pub fn prompt_via_stdin(&self) -> bool {
        self.prompt_via_stdin
    }

    /// Human-readable command line, for logs and `resolve` output.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(
            self.args
                .iter()
                .map(|a| shlex::try_quote(a).map(|q| q.into_owned()).unwrap_or_else(|_| a.clone())),
        );
        parts.join(" ")
    }
}

// ─── Stream events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    AssistantText,
    ToolUse,
}

/// One live-progress event, already collapsed and truncated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedStreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedStreamEvent {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::AssistantText,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_use(text: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::ToolUse,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// ─── Extraction results ───────────────────────────────────────────────────

/// Outcome of parsing a provider's captured output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// The assistant text the payload was (or would have been) pulled from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn found(data: serde_json::Value, raw_text: Option<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            raw_text,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, raw_text: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            raw_text,
            error: Some(error.into()),
        }
    }
}

/// What `Provider::execute` hands back to callers.
///
/// Malformed output is not an error: it resolves as `Unparsed` so the caller
/// can still surface the text instead of failing the whole review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderResponse {
    Parsed {
        data: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_text: Option<String>,
    },
    Unparsed {
        raw: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProviderResponse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ProviderResponse::Parsed { .. })
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            ProviderResponse::Parsed { data, .. } => Some(data),
            ProviderResponse::Unparsed { .. } => None,
        }
    }
}

// ─── Execution options ────────────────────────────────────────────────────

/// Receives live progress events. Runs synchronously on the stdout path, so
/// implementations should be quick. Errors and panics are logged and dropped.
pub trait ProgressSink: Send + Sync {
    fn on_stream_event(&self, event: &NormalizedStreamEvent) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&NormalizedStreamEvent) -> Result<()> + Send + Sync,
{
    fn on_stream_event(&self, event: &NormalizedStreamEvent) -> Result<()> {
        self(event)
    }
}

pub type ProcessCallback = Arc<dyn Fn(&ProcessHandle) + Send + Sync>;

/// Per-call knobs for one provider invocation.
#[derive(Clone)]
pub struct ExecutionOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Prefix for log lines, e.g. `level2:security`.
    pub log_tag: Option<String>,
    /// Correlates the process with the cancellation registry.
    pub analysis_id: Option<String>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Called right after spawn with a handle that can terminate the process.
    pub on_process: Option<ProcessCallback>,
    /// Return raw stdout without running the response extractor.
    pub skip_extraction: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            log_tag: None,
            analysis_id: None,
            progress: None,
            on_process: None,
            skip_extraction: false,
        }
    }
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("cwd", &self.cwd)
            .field("timeout", &self.timeout)
            .field("log_tag", &self.log_tag)
            .field("analysis_id", &self.analysis_id)
            .field("progress", &self.progress.is_some())
            .field("on_process", &self.on_process.is_some())
            .field("skip_extraction", &self.skip_extraction)
            .finish()
    }
}

impl ExecutionOptions {
    pub fn tag(&self) -> &str {
        self.log_tag.as_deref().unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default)]
        cli_model: CliModel,
    }

    fn holder(yaml: &str) -> CliModel {
        serde_yaml::from_str::<Holder>(yaml).unwrap().cli_model
    }

    #[test]
    fn cli_model_yaml_tristate() {
        assert_eq!(holder("{}"), CliModel::Inherit);
        assert_eq!(holder("cli_model: null"), CliModel::Suppress);
        assert_eq!(holder("cli_model: ~"), CliModel::Suppress);
        assert_eq!(holder("cli_model: sonnet"), CliModel::Name("sonnet".into()));
        assert_eq!(holder("cli_model: ''"), CliModel::Name(String::new()));
    }

    #[test]
    fn command_env_var_is_upper_snake() {
        assert_eq!(command_env_var("claude"), "CLAUDE_CMD");
        assert_eq!(command_env_var("cursor-agent"), "CURSOR_AGENT_CMD");
    }

    #[test]
    fn invocation_detects_shell_mode_from_whitespace() {
        let direct = ResolvedInvocation::new("claude".into(), vec![], BTreeMap::new());
        assert!(!direct.use_shell());
        let shell = ResolvedInvocation::new("npx claude".into(), vec![], BTreeMap::new());
        assert!(shell.use_shell());
        assert!(shell.prompt_via_stdin());
    }

    #[test]
    fn stream_event_serializes_with_type_tag() {
        let ev = NormalizedStreamEvent::tool_use("Read src/lib.rs");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["text"], "Read src/lib.rs");
    }

    #[test]
    fn unparsed_response_has_no_data() {
        let resp = ProviderResponse::Unparsed {
            raw: "text".into(),
            error: None,
        };
        assert!(!resp.is_parsed());
        assert!(resp.data().is_none());
    }
}
