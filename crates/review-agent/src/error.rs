use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewAgentError {
    #[error("{provider} CLI not found\n  {install_instructions}")]
    NotInstalled {
        provider: String,
        install_instructions: String,
    },

    #[error("{provider} timed out after {}ms", .timeout.as_millis())]
    TimedOut { provider: String, timeout: Duration },

    #[error("analysis {analysis_id} was cancelled")]
    Cancelled { analysis_id: String },

    #[error("{provider} exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    ProcessFailed {
        provider: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Extraction failed even after the fallback. Surfaced to callers as
    /// `ProviderResponse::Unparsed`, never as a rejection.
    #[error("could not extract JSON: {0}")]
    MalformedOutput(String),

    /// A progress sink failed. Logged at the call site, never propagated.
    #[error("progress callback failed: {0}")]
    Callback(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown model '{model}' for provider {provider}")]
    UnknownModel { provider: String, model: String },

    #[error("config error in {path}: {message}")]
    Config { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReviewAgentError {
    /// `true` for the outcomes a caller should treat as "the user asked for
    /// this" rather than as a failure worth reporting loudly.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReviewAgentError::Cancelled { .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {trimmed}")
    }
}
