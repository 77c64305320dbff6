use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::cancel::CancellationRegistry;
use crate::provider::Provider;
use crate::registry::ProviderRegistry;
use crate::types::{ExecutionOptions, ProgressSink, ProviderResponse};
use crate::{ReviewAgentError, Result};

// ─── Voice ────────────────────────────────────────────────────────────────

/// One reviewer in a run: a provider and optionally a model (`claude:opus`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FromStr for Voice {
    type Err = ReviewAgentError;

    fn from_str(s: &str) -> Result<Self> {
        let (provider, model) = match s.split_once(':') {
            Some((p, m)) => (p.trim(), Some(m.trim())),
            None => (s.trim(), None),
        };
        if provider.is_empty() {
            return Err(ReviewAgentError::UnknownProvider(s.to_string()));
        }
        Ok(Voice {
            provider: provider.to_string(),
            model: model.filter(|m| !m.is_empty()).map(str::to_string),
        })
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}:{}", self.provider, model),
            None => f.write_str(&self.provider),
        }
    }
}

/// Builds a progress sink for one voice.
pub type SinkFactory = Arc<dyn Fn(&Voice) -> Arc<dyn ProgressSink> + Send + Sync>;

// ─── ReviewRun ────────────────────────────────────────────────────────────

struct Member {
    voice: Voice,
    analysis_id: String,
    provider: Provider,
}

/// Outcome of one voice, in the order the voices were given.
#[derive(Debug)]
pub struct VoiceOutcome {
    pub voice: Voice,
    pub analysis_id: String,
    pub result: Result<ProviderResponse>,
}

/// Several voices reviewing the same prompt concurrently.
///
/// Every voice gets its own analysis id, grouped under the run id in the
/// cancellation registry so [`cancel`](Self::cancel) stops all of them.
pub struct ReviewRun {
    run_id: String,
    members: Vec<Member>,
    cancellations: Arc<CancellationRegistry>,
    progress: Option<SinkFactory>,
}

impl ReviewRun {
    /// Resolve every voice up front; an unknown provider fails the whole run
    /// before anything is spawned.
    pub fn new(registry: &ProviderRegistry, voices: Vec<Voice>) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let cancellations = Arc::clone(registry.cancellations());

        let members = voices
            .into_iter()
            .map(|voice| {
                let provider = registry.create_provider(&voice.provider, voice.model.as_deref())?;
                Ok(Member {
                    voice,
                    analysis_id: Uuid::new_v4().to_string(),
                    provider,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for member in &members {
            cancellations.register_run(&run_id, &member.analysis_id);
        }

        Ok(Self {
            run_id,
            members,
            cancellations,
            progress: None,
        })
    }

    pub fn on_progress(mut self, factory: SinkFactory) -> Self {
        self.progress = Some(factory);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn analysis_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.analysis_id.as_str()).collect()
    }

    /// Run every voice to completion.
    pub async fn execute(&self, prompt: &str, base: &ExecutionOptions) -> Vec<VoiceOutcome> {
        info!(run_id = %self.run_id, voices = self.members.len(), "starting review run");

        let runs = self.members.iter().map(|member| {
            let mut opts = base.clone();
            opts.analysis_id = Some(member.analysis_id.clone());
            opts.log_tag = Some(match &base.log_tag {
                Some(tag) => format!("{tag}:{}", member.voice),
                None => member.voice.to_string(),
            });
            if let Some(factory) = &self.progress {
                opts.progress = Some(factory(&member.voice));
            }
            async move {
                let result = member.provider.execute(prompt, &opts).await;
                VoiceOutcome {
                    voice: member.voice.clone(),
                    analysis_id: member.analysis_id.clone(),
                    result,
                }
            }
        });
        let outcomes = join_all(runs).await;

        self.cancellations.clear_run(&self.run_id);
        info!(
            run_id = %self.run_id,
            parsed = outcomes.iter().filter(|o| matches!(&o.result, Ok(r) if r.is_parsed())).count(),
            "review run finished"
        );
        outcomes
    }

    /// Cancel every voice still running. Returns the number of processes
    /// signalled.
    pub fn cancel(&self) -> usize {
        self.cancellations.cancel_run(&self.run_id)
    }
}

impl Drop for ReviewRun {
    fn drop(&mut self) {
        self.cancellations.clear_run(&self.run_id);
    }
}
