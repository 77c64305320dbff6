//! Computes the effective CLI invocation for a provider/model pair from the
//! built-in catalogue, the provider config block, and the process environment.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::ProviderConfigOverride;
use crate::types::{CliModel, ProviderDefinition, ResolvedInvocation};

/// Model-dependent pieces of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    /// Either empty (flag suppressed) or exactly `[model_flag, value]`.
    pub cli_args: Vec<String>,
    pub extra_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Reads a variable from the real process environment, treating blank values
/// as unset.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub struct ConfigResolver<'a> {
    definition: &'a ProviderDefinition,
    config: Option<&'a ProviderConfigOverride>,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(
        definition: &'a ProviderDefinition,
        config: Option<&'a ProviderConfigOverride>,
    ) -> Self {
        Self { definition, config }
    }

    /// The value handed to the model flag; `None` when the flag is suppressed.
    ///
    /// Precedence: per-model override, then the catalogue entry (its explicit
    /// `cli_model`, else its canonical id), then the raw `model_id`.
    pub fn cli_model(&self, model_id: &str) -> Option<String> {
        let builtin = self.definition.find_model(model_id);
        let canonical = builtin.map(|m| m.id.as_str());

        let from_override = self
            .config
            .and_then(|c| c.model(model_id, canonical))
            .map(|m| &m.cli_model)
            .filter(|c| !c.is_inherit());
        let from_catalogue = builtin.map(|m| &m.cli_model).filter(|c| !c.is_inherit());

        match from_override.or(from_catalogue) {
            Some(CliModel::Name(name)) => Some(name.clone()),
            Some(_) => None,
            None => Some(builtin.map_or(model_id, |m| m.id.as_str()).to_string()),
        }
    }

    pub fn resolve_model_config(&self, model_id: &str) -> ModelConfig {
        let builtin = self.definition.find_model(model_id);
        let canonical = builtin.map(|m| m.id.as_str());
        let model_override = self.config.and_then(|c| c.model(model_id, canonical));

        let cli_args = match self.cli_model(model_id) {
            Some(name) => vec![self.definition.model_flag.clone(), name],
            None => Vec::new(),
        };

        let mut extra_args = Vec::new();
        let mut env = BTreeMap::new();
        if let Some(m) = builtin {
            extra_args.extend(m.extra_args.iter().cloned());
            env.extend(m.env.clone());
        }
        if let Some(cfg) = self.config {
            extra_args.extend(cfg.extra_args.iter().cloned());
            env.extend(cfg.env.clone());
        }
        if let Some(m) = model_override {
            extra_args.extend(m.extra_args.iter().cloned());
            env.extend(m.env.clone());
        }

        ModelConfig {
            cli_args,
            extra_args,
            env,
        }
    }

    /// Environment override, then provider config, then the hard-coded default.
    pub fn resolve_command(&self, lookup: &dyn Fn(&str) -> Option<String>) -> String {
        if let Some(cmd) = lookup(&self.definition.command_env) {
            debug!(
                provider = %self.definition.id,
                var = %self.definition.command_env,
                "command overridden from environment"
            );
            return cmd;
        }
        self.config
            .and_then(|c| c.command.clone())
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.definition.command.clone())
    }

    pub fn build_invocation(
        &self,
        model_id: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> ResolvedInvocation {
        let command = self.resolve_command(lookup);
        let model = self.resolve_model_config(model_id);
        let yolo = self.config.map(|c| c.yolo).unwrap_or(false);

        let mut args = self.definition.base_args.clone();
        args.extend(model.cli_args);
        if yolo {
            args.extend(self.definition.bypass_args.iter().cloned());
        } else {
            args.extend(self.definition.restricted_args.iter().cloned());
        }
        args.extend(model.extra_args);
        args.extend(self.definition.trailing_args.iter().cloned());

        ResolvedInvocation::new(command, args, model.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{builtin_providers, claude, codex, cursor_agent};
    use crate::config::ModelOverride;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn claude_with(cfg: ProviderConfigOverride) -> (ProviderDefinition, ProviderConfigOverride) {
        (claude(), cfg)
    }

    #[test]
    fn claude_opus_without_overrides() {
        let def = claude();
        let r = ConfigResolver::new(&def, None);
        let cfg = r.resolve_model_config("opus");
        assert_eq!(cfg.cli_args, vec!["--model", "opus"]);
        assert_eq!(cfg.env.len(), 1);
        assert_eq!(cfg.env.get("EFFORT_LEVEL").map(String::as_str), Some("high"));
        assert!(cfg.extra_args.is_empty());
    }

    #[test]
    fn model_args_are_empty_or_one_pair_for_every_model() {
        for def in builtin_providers() {
            let r = ConfigResolver::new(&def, None);
            for m in &def.models {
                let args = r.resolve_model_config(&m.id).cli_args;
                assert!(
                    args.is_empty() || (args.len() == 2 && args[0] == def.model_flag),
                    "{}/{}: {:?}",
                    def.id,
                    m.id,
                    args
                );
            }
        }
    }

    #[test]
    fn suppressed_model_omits_flag() {
        let def = cursor_agent();
        let r = ConfigResolver::new(&def, None);
        assert!(r.resolve_model_config("auto").cli_args.is_empty());
    }

    #[test]
    fn empty_string_is_passed_through_not_suppressed() {
        let (def, cfg) = claude_with(ProviderConfigOverride {
            models: vec![ModelOverride {
                id: "sonnet".into(),
                cli_model: CliModel::Name(String::new()),
                ..Default::default()
            }],
            ..Default::default()
        });
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert_eq!(r.resolve_model_config("sonnet").cli_args, vec!["--model", ""]);
    }

    #[test]
    fn override_beats_catalogue_beats_raw_id() {
        let (def, cfg) = claude_with(ProviderConfigOverride {
            models: vec![ModelOverride {
                id: "opus".into(),
                cli_model: CliModel::Name("claude-opus-4-1-20250805".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert_eq!(r.cli_model("opus").as_deref(), Some("claude-opus-4-1-20250805"));
        assert_eq!(r.cli_model("sonnet").as_deref(), Some("sonnet"));
        assert_eq!(
            r.cli_model("some-future-model").as_deref(),
            Some("some-future-model")
        );
    }

    #[test]
    fn override_can_suppress_catalogue_model() {
        let (def, cfg) = claude_with(ProviderConfigOverride {
            models: vec![ModelOverride {
                id: "haiku".into(),
                cli_model: CliModel::Suppress,
                ..Default::default()
            }],
            ..Default::default()
        });
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert!(r.resolve_model_config("haiku").cli_args.is_empty());
    }

    #[test]
    fn alias_resolves_to_canonical_cli_value() {
        let def = codex();
        let r = ConfigResolver::new(&def, None);
        assert_eq!(
            r.resolve_model_config("codex-mini").cli_args,
            vec!["-m", "gpt-5-codex-mini"]
        );
        // Catalogue entry with an explicit cli_model differing from its id.
        assert_eq!(
            r.resolve_model_config("gpt-5-codex-high").cli_args,
            vec!["-m", "gpt-5-codex"]
        );
    }

    #[test]
    fn env_merge_per_model_wins_over_provider_over_builtin() {
        let mut provider_env = BTreeMap::new();
        provider_env.insert("EFFORT_LEVEL".to_string(), "medium".to_string());
        provider_env.insert("SHARED".to_string(), "provider".to_string());
        let mut model_env = BTreeMap::new();
        model_env.insert("SHARED".to_string(), "model".to_string());

        let (def, cfg) = claude_with(ProviderConfigOverride {
            env: provider_env,
            models: vec![ModelOverride {
                id: "opus".into(),
                env: model_env,
                ..Default::default()
            }],
            ..Default::default()
        });
        let r = ConfigResolver::new(&def, Some(&cfg));
        let env = r.resolve_model_config("opus").env;
        assert_eq!(env["EFFORT_LEVEL"], "medium");
        assert_eq!(env["SHARED"], "model");

        let mut top = BTreeMap::new();
        top.insert("EFFORT_LEVEL".to_string(), "low".to_string());
        let (def, cfg) = claude_with(ProviderConfigOverride {
            models: vec![ModelOverride {
                id: "opus".into(),
                env: top,
                ..Default::default()
            }],
            ..Default::default()
        });
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert_eq!(r.resolve_model_config("opus").env["EFFORT_LEVEL"], "low");
    }

    #[test]
    fn extra_args_append_in_layer_order_keeping_duplicates() {
        let def = codex();
        let cfg = ProviderConfigOverride {
            extra_args: vec!["-c".into(), "a=1".into()],
            models: vec![ModelOverride {
                id: "gpt-5-codex-high".into(),
                extra_args: vec!["-c".into(), "b=2".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert_eq!(
            r.resolve_model_config("gpt-5-codex-high").extra_args,
            vec!["-c", "model_reasoning_effort=\"high\"", "-c", "a=1", "-c", "b=2"]
        );
    }

    #[test]
    fn command_precedence_env_then_config_then_default() {
        let def = claude();
        let cfg = ProviderConfigOverride {
            command: Some("/opt/claude".into()),
            ..Default::default()
        };

        let env_lookup = |key: &str| (key == "CLAUDE_CMD").then(|| "npx claude".to_string());
        let r = ConfigResolver::new(&def, Some(&cfg));
        assert_eq!(r.resolve_command(&env_lookup), "npx claude");
        assert_eq!(r.resolve_command(&no_env), "/opt/claude");
        assert_eq!(ConfigResolver::new(&def, None).resolve_command(&no_env), "claude");
    }

    #[test]
    fn invocation_layout_and_shell_mode() {
        let def = codex();
        let r = ConfigResolver::new(&def, None);
        let inv = r.build_invocation("gpt-5-codex", &no_env);
        assert_eq!(
            inv.args(),
            &[
                "exec",
                "--json",
                "--skip-git-repo-check",
                "-m",
                "gpt-5-codex",
                "--sandbox",
                "read-only",
                "-"
            ]
        );
        assert!(!inv.use_shell());

        let lookup = |key: &str| (key == "CODEX_CMD").then(|| "node /opt/codex.js".to_string());
        assert!(r.build_invocation("gpt-5-codex", &lookup).use_shell());
    }

    #[test]
    fn yolo_swaps_restricted_for_bypass_args() {
        let def = claude();
        let cfg = ProviderConfigOverride {
            yolo: true,
            ..Default::default()
        };
        let inv = ConfigResolver::new(&def, Some(&cfg)).build_invocation("sonnet", &no_env);
        assert!(inv.args().contains(&"--dangerously-skip-permissions".to_string()));
        assert!(!inv.args().contains(&"--allowedTools".to_string()));
    }
}
