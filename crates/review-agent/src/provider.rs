use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process::ProcessExecutor;
use crate::response::parse_response;
use crate::types::{
    ExecutionOptions, ExtractionResult, ProviderDefinition, ProviderResponse, ResolvedInvocation,
};
use crate::Result;

/// Upper bound for the JSON-extraction re-invocation.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Budget for [`Provider::test_availability`].
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Provider ─────────────────────────────────────────────────────────────

/// One provider bound to one model. The invocation is fixed at construction;
/// use [`crate::ProviderRegistry::create_provider`] to build one.
pub struct Provider {
    definition: ProviderDefinition,
    model: String,
    executor: ProcessExecutor,
    /// Fast-tier invocation used only to pull JSON out of free text.
    extractor: Option<ProcessExecutor>,
}

impl Provider {
    pub(crate) fn new(
        definition: ProviderDefinition,
        model: String,
        executor: ProcessExecutor,
        extractor: Option<ProcessExecutor>,
    ) -> Self {
        Self {
            definition,
            model,
            executor,
            extractor,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn definition(&self) -> &ProviderDefinition {
        &self.definition
    }

    pub fn invocation(&self) -> &ResolvedInvocation {
        self.executor.invocation()
    }

    pub fn extraction_invocation(&self) -> Option<&ResolvedInvocation> {
        self.extractor.as_ref().map(ProcessExecutor::invocation)
    }

    /// Run the prompt and parse the result.
    ///
    /// Process-level failures (`NotInstalled`, `TimedOut`, `Cancelled`,
    /// `ProcessFailed`) are errors. Output that yields no JSON payload
    /// resolves as [`ProviderResponse::Unparsed`].
    pub async fn execute(&self, prompt: &str, opts: &ExecutionOptions) -> Result<ProviderResponse> {
        info!(
            provider = %self.definition.id,
            model = %self.model,
            tag = %opts.tag(),
            analysis_id = ?opts.analysis_id,
            "executing provider"
        );
        let captured = self.executor.run(prompt, opts).await?;

        if opts.skip_extraction {
            return Ok(ProviderResponse::Unparsed {
                raw: captured.stdout,
                error: None,
            });
        }

        let result = parse_response(self.definition.format, &captured.stdout);
        if let Some(data) = result.data.clone().filter(|_| result.success) {
            return Ok(ProviderResponse::Parsed {
                data,
                raw_text: result.raw_text,
            });
        }

        let Some(text) = result.raw_text.clone() else {
            // Nothing the model said; no point asking another model about it.
            warn!(provider = %self.definition.id, tag = %opts.tag(), error = ?result.error, "no assistant text to extract from");
            return Ok(ProviderResponse::Unparsed {
                raw: captured.stdout,
                error: result.error,
            });
        };

        match self.extract_with_model(&text, opts).await? {
            Some(fallback) if fallback.success => {
                info!(provider = %self.definition.id, tag = %opts.tag(), "payload recovered by extraction model");
                Ok(ProviderResponse::Parsed {
                    data: fallback.data.unwrap_or_default(),
                    raw_text: Some(text),
                })
            }
            Some(fallback) => Ok(ProviderResponse::Unparsed {
                raw: text,
                error: fallback.error.or(result.error),
            }),
            None => Ok(ProviderResponse::Unparsed {
                raw: text,
                error: result.error,
            }),
        }
    }

    /// Re-invoke the fast-tier model to extract JSON from `text`.
    ///
    /// `Ok(None)` when the provider has no extraction hook. Failures of the
    /// extraction run itself degrade to an unsuccessful result, except
    /// cancellation which is propagated.
    async fn extract_with_model(
        &self,
        text: &str,
        opts: &ExecutionOptions,
    ) -> Result<Option<ExtractionResult>> {
        let Some(extractor) = &self.extractor else {
            debug!(provider = %self.definition.id, "provider has no extraction hook");
            return Ok(None);
        };

        let fallback_opts = ExecutionOptions {
            cwd: opts.cwd.clone(),
            timeout: opts.timeout.min(EXTRACTION_TIMEOUT),
            log_tag: Some(format!("{}:extract", opts.tag())),
            analysis_id: opts.analysis_id.clone(),
            progress: None,
            on_process: None,
            skip_extraction: true,
        };
        info!(
            provider = %self.definition.id,
            model = %self.definition.fast_model(),
            tag = %opts.tag(),
            "no JSON in reply; invoking extraction model"
        );

        match extractor.run(&extraction_prompt(text), &fallback_opts).await {
            Ok(captured) => Ok(Some(parse_response(self.definition.format, &captured.stdout))),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(provider = %self.definition.id, error = %e, "extraction run failed");
                Ok(Some(ExtractionResult::failed(
                    format!("extraction run failed: {e}"),
                    Some(text.to_string()),
                )))
            }
        }
    }

    /// Whether the provider's CLI is installed and answers `--version`.
    pub async fn test_availability(&self) -> bool {
        let available = self.executor.probe_version(AVAILABILITY_TIMEOUT).await;
        debug!(provider = %self.definition.id, available, "availability probe");
        available
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "The text between the markers below is the output of a code review. \
         Extract the JSON document it contains and reply with only that JSON: \
         no prose, no code fences.\n\n\
         ---BEGIN OUTPUT---\n{text}\n---END OUTPUT---\n"
    )
}
