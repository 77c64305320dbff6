//! `review-agent`: drive AI coding-agent CLIs as subprocesses and turn their
//! output into a structured code-review payload.
//!
//! Supported CLIs: Claude Code, Codex, Gemini, Cursor Agent, Copilot and Pi.
//! Each is launched non-interactively with the prompt on stdin.
//!
//! # Architecture
//!
//! ```text
//! Settings + catalogue
//!     │
//!     ▼
//! ConfigResolver     ← command / args / env per provider + model
//!     │
//!     ▼
//! ProcessExecutor    ← spawn, stdin prompt, timeout, cancellation,
//!     │                 settle-once; stdout is teed:
//!     ├──────────────► StreamNormalizer → ProgressSink   (best effort)
//!     ▼
//! parse_response     ← per-format transcript + JSON ladder (authoritative)
//!     │
//!     ▼
//! Provider::execute  ← fast-tier extraction fallback → ProviderResponse
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use review_agent::{CancellationRegistry, ProviderRegistry, Settings};
//!
//! let registry = ProviderRegistry::from_process_env(
//!     Settings::default(),
//!     Arc::new(CancellationRegistry::new()),
//! );
//! let provider = registry.create_provider("claude", Some("opus"))?;
//! let response = provider
//!     .execute("Review the staged diff. Reply with JSON.", &registry.execution_options())
//!     .await?;
//! if let Some(data) = response.data() {
//!     println!("{data:#}");
//! }
//! ```

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod process;
pub mod provider;
pub mod registry;
pub mod resolve;
pub mod response;
pub mod review;
pub mod stream;
pub mod types;

#[cfg(test)]
mod tests;

pub use cancel::CancellationRegistry;
pub use config::{ConfigWarning, ModelOverride, ProviderConfigOverride, Settings, WarnLevel};
pub use error::ReviewAgentError;
pub use extract::extract_json;
pub use process::{CapturedOutput, ProcessExecutor, ProcessHandle};
pub use provider::Provider;
pub use registry::{EnvLookup, ProviderRegistry};
pub use resolve::{ConfigResolver, ModelConfig};
pub use response::{parse_response, parse_text};
pub use review::{ReviewRun, SinkFactory, Voice, VoiceOutcome};
pub use stream::StreamNormalizer;
pub use types::{
    CliModel, ExecutionOptions, ExtractionResult, ModelDefinition, NormalizedStreamEvent,
    OutputFormat, ProgressSink, ProviderDefinition, ProviderResponse, ResolvedInvocation,
    StreamEventKind, Tier,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ReviewAgentError>;
