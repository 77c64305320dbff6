//! Built-in provider definitions.
//!
//! Each entry describes how to launch one coding-agent CLI in a
//! non-interactive, machine-readable mode with the prompt on stdin.

use crate::types::{
    command_env_var, CliModel, ModelDefinition, OutputFormat, ProviderDefinition, Tier,
};

/// Every provider shipped with the crate, in display order.
pub fn builtin_providers() -> Vec<ProviderDefinition> {
    vec![claude(), codex(), gemini(), cursor_agent(), copilot(), pi()]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const READ_ONLY_TOOLS: &str = "Read,Grep,Glob,Bash(git diff:*),Bash(git log:*),Bash(git show:*),Bash(git status:*)";

pub fn claude() -> ProviderDefinition {
    ProviderDefinition {
        id: "claude".into(),
        name: "Claude".into(),
        command: "claude".into(),
        command_env: command_env_var("claude"),
        base_args: strings(&["-p", "--output-format", "stream-json", "--verbose"]),
        trailing_args: vec![],
        model_flag: "--model".into(),
        bypass_args: strings(&["--dangerously-skip-permissions"]),
        restricted_args: strings(&["--allowedTools", READ_ONLY_TOOLS]),
        format: OutputFormat::ClaudeStream,
        models: vec![
            ModelDefinition::new("haiku", "Claude Haiku", Tier::Fast)
                .alias("claude-haiku")
                .alias("claude-haiku-4-5")
                .describe("Quick pass, also used for JSON extraction"),
            ModelDefinition::new("sonnet", "Claude Sonnet", Tier::Balanced)
                .alias("claude-sonnet")
                .alias("claude-sonnet-4-5")
                .describe("Default reviewer"),
            ModelDefinition::new("opus", "Claude Opus", Tier::Thorough)
                .alias("claude-opus")
                .alias("claude-opus-4-1")
                .env("EFFORT_LEVEL", "high")
                .describe("Deep review with extended reasoning"),
        ],
        default_model: "sonnet".into(),
        install_instructions: "Install Claude Code: npm install -g @anthropic-ai/claude-code"
            .into(),
        supports_extraction: true,
    }
}

pub fn codex() -> ProviderDefinition {
    ProviderDefinition {
        id: "codex".into(),
        name: "Codex".into(),
        command: "codex".into(),
        command_env: command_env_var("codex"),
        base_args: strings(&["exec", "--json", "--skip-git-repo-check"]),
        trailing_args: strings(&["-"]),
        model_flag: "-m".into(),
        bypass_args: strings(&["--dangerously-bypass-approvals-and-sandbox"]),
        restricted_args: strings(&["--sandbox", "read-only"]),
        format: OutputFormat::CodexJson,
        models: vec![
            ModelDefinition::new("gpt-5-codex-mini", "GPT-5 Codex Mini", Tier::Fast)
                .alias("codex-mini")
                .describe("Fast and cheap"),
            ModelDefinition::new("gpt-5-codex", "GPT-5 Codex", Tier::Balanced)
                .alias("codex")
                .describe("Default reviewer"),
            ModelDefinition::new("gpt-5-codex-high", "GPT-5 Codex (high effort)", Tier::Thorough)
                .cli_model(CliModel::Name("gpt-5-codex".into()))
                .arg("-c")
                .arg("model_reasoning_effort=\"high\"")
                .describe("Same model with high reasoning effort"),
        ],
        default_model: "gpt-5-codex".into(),
        install_instructions: "Install Codex CLI: npm install -g @openai/codex".into(),
        supports_extraction: true,
    }
}

pub fn gemini() -> ProviderDefinition {
    ProviderDefinition {
        id: "gemini".into(),
        name: "Gemini".into(),
        command: "gemini".into(),
        command_env: command_env_var("gemini"),
        base_args: strings(&["--output-format", "stream-json"]),
        trailing_args: vec![],
        model_flag: "-m".into(),
        bypass_args: strings(&["--yolo"]),
        restricted_args: strings(&["--approval-mode", "default"]),
        format: OutputFormat::GeminiStream,
        models: vec![
            ModelDefinition::new("gemini-2.5-flash", "Gemini 2.5 Flash", Tier::Fast)
                .alias("flash"),
            ModelDefinition::new("gemini-2.5-pro", "Gemini 2.5 Pro", Tier::Thorough).alias("pro"),
        ],
        default_model: "gemini-2.5-pro".into(),
        install_instructions: "Install Gemini CLI: npm install -g @google/gemini-cli".into(),
        supports_extraction: true,
    }
}

pub fn cursor_agent() -> ProviderDefinition {
    ProviderDefinition {
        id: "cursor-agent".into(),
        name: "Cursor Agent".into(),
        command: "cursor-agent".into(),
        command_env: command_env_var("cursor-agent"),
        base_args: strings(&["-p", "--output-format", "stream-json"]),
        trailing_args: vec![],
        model_flag: "--model".into(),
        bypass_args: strings(&["--force"]),
        restricted_args: vec![],
        format: OutputFormat::ClaudeStream,
        models: vec![
            ModelDefinition::new("auto", "Auto", Tier::Free)
                .cli_model(CliModel::Suppress)
                .describe("Let Cursor pick the model"),
            ModelDefinition::new("cheetah", "Cheetah", Tier::Fast),
            ModelDefinition::new("sonnet-4.5", "Sonnet 4.5", Tier::Balanced).alias("sonnet"),
            ModelDefinition::new("gpt-5", "GPT-5", Tier::Thorough),
            ModelDefinition::new("opus-4.1", "Opus 4.1", Tier::Premium).alias("opus"),
        ],
        default_model: "auto".into(),
        install_instructions: "Install Cursor Agent: curl https://cursor.com/install -fsS | bash"
            .into(),
        supports_extraction: true,
    }
}

pub fn copilot() -> ProviderDefinition {
    ProviderDefinition {
        id: "copilot".into(),
        name: "GitHub Copilot".into(),
        command: "copilot".into(),
        command_env: command_env_var("copilot"),
        base_args: strings(&["--silent", "--no-color"]),
        trailing_args: vec![],
        model_flag: "--model".into(),
        bypass_args: strings(&["--allow-all-tools"]),
        restricted_args: strings(&["--deny-tool", "write"]),
        format: OutputFormat::PlainText,
        models: vec![
            ModelDefinition::new("default", "Copilot default", Tier::Balanced)
                .cli_model(CliModel::Suppress),
            ModelDefinition::new("claude-sonnet-4.5", "Claude Sonnet 4.5", Tier::Thorough),
            ModelDefinition::new("gpt-5", "GPT-5", Tier::Premium),
        ],
        default_model: "default".into(),
        install_instructions: "Install GitHub Copilot CLI: npm install -g @github/copilot".into(),
        supports_extraction: false,
    }
}

pub fn pi() -> ProviderDefinition {
    ProviderDefinition {
        id: "pi".into(),
        name: "Pi".into(),
        command: "pi".into(),
        command_env: command_env_var("pi"),
        base_args: strings(&["--mode", "json", "-p"]),
        trailing_args: vec![],
        model_flag: "--model".into(),
        bypass_args: vec![],
        restricted_args: strings(&["--tools", "read,grep,find,ls"]),
        format: OutputFormat::PiJson,
        models: vec![
            ModelDefinition::new("claude-haiku-4-5", "Haiku 4.5", Tier::Fast).alias("haiku"),
            ModelDefinition::new("claude-sonnet-4-5", "Sonnet 4.5", Tier::Balanced)
                .alias("sonnet"),
            ModelDefinition::new("gpt-5", "GPT-5", Tier::Thorough),
        ],
        default_model: "claude-sonnet-4-5".into(),
        install_instructions:
            "Install Pi: npm install -g @mariozechner/pi-coding-agent".into(),
        supports_extraction: true,
    }
}
