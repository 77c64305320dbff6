use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancellationRegistry;
use crate::catalog::builtin_providers;
use crate::config::Settings;
use crate::process::ProcessExecutor;
use crate::provider::Provider;
use crate::resolve::{process_env, ConfigResolver};
use crate::types::{ExecutionOptions, ProviderDefinition};
use crate::{ReviewAgentError, Result};

/// Environment lookup used for command overrides (`<ID>_CMD`).
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

// ─── ProviderRegistry ─────────────────────────────────────────────────────

/// Maps provider ids to their definitions and builds [`Provider`]s wired to
/// the shared settings and cancellation registry.
pub struct ProviderRegistry {
    definitions: Vec<ProviderDefinition>,
    settings: Settings,
    cancellations: Arc<CancellationRegistry>,
    env: EnvLookup,
}

impl ProviderRegistry {
    /// Registry pre-loaded with the built-in catalogue.
    pub fn new(settings: Settings, cancellations: Arc<CancellationRegistry>, env: EnvLookup) -> Self {
        let mut registry = Self {
            definitions: Vec::new(),
            settings,
            cancellations,
            env,
        };
        for definition in builtin_providers() {
            registry.register_provider(definition);
        }
        registry
    }

    /// Same as [`new`](Self::new), reading overrides from the real environment.
    pub fn from_process_env(settings: Settings, cancellations: Arc<CancellationRegistry>) -> Self {
        Self::new(settings, cancellations, Arc::new(process_env))
    }

    /// Add a provider, replacing any existing definition with the same id.
    pub fn register_provider(&mut self, definition: ProviderDefinition) {
        match self.definitions.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => {
                debug!(provider = %definition.id, "replacing provider definition");
                *existing = definition;
            }
            None => self.definitions.push(definition),
        }
    }

    pub fn get_provider_class(&self, id: &str) -> Result<&ProviderDefinition> {
        self.definitions
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ReviewAgentError::UnknownProvider(id.to_string()))
    }

    pub fn providers(&self) -> &[ProviderDefinition] {
        &self.definitions
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    pub fn resolver(&self, id: &str) -> Result<ConfigResolver<'_>> {
        let definition = self.get_provider_class(id)?;
        Ok(ConfigResolver::new(definition, self.settings.provider(id)))
    }

    /// Build a provider bound to `model` (the provider's default when `None`).
    ///
    /// Model ids missing from the catalogue are accepted and passed to the
    /// CLI verbatim.
    pub fn create_provider(&self, id: &str, model: Option<&str>) -> Result<Provider> {
        let definition = self.get_provider_class(id)?;
        let model = model.unwrap_or(&definition.default_model).trim();
        if model.is_empty() {
            return Err(ReviewAgentError::UnknownModel {
                provider: id.to_string(),
                model: model.to_string(),
            });
        }

        let resolver = ConfigResolver::new(definition, self.settings.provider(id));
        let executor = self.executor(definition, resolver.build_invocation(model, &*self.env));
        let extractor = definition.supports_extraction.then(|| {
            self.executor(
                definition,
                resolver.build_invocation(definition.fast_model(), &*self.env),
            )
        });

        debug!(
            provider = %id,
            model,
            command = %executor.invocation().display_command(),
            "provider created"
        );
        Ok(Provider::new(
            definition.clone(),
            model.to_string(),
            executor,
            extractor,
        ))
    }

    /// Execution options carrying the configured default timeout.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            timeout: self.settings.timeout(),
            ..Default::default()
        }
    }

    fn executor(
        &self,
        definition: &ProviderDefinition,
        invocation: crate::types::ResolvedInvocation,
    ) -> ProcessExecutor {
        ProcessExecutor::new(definition, invocation)
            .with_bin_dir(self.settings.bin_dir.clone())
            .with_cancellations(Some(Arc::clone(&self.cancellations)))
    }
}
