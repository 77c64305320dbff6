use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{CliModel, ProviderDefinition, DEFAULT_TIMEOUT};
use crate::{ReviewAgentError, Result};

// ---------------------------------------------------------------------------
// ModelOverride
// ---------------------------------------------------------------------------

/// Per-model override inside a provider's config block. May also introduce a
/// model id the built-in catalogue does not know.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelOverride {
    pub id: String,
    #[serde(default, skip_serializing_if = "CliModel::is_inherit")]
    pub cli_model: CliModel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// ProviderConfigOverride
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfigOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelOverride>,
    /// Skip the provider's permission prompts entirely.
    #[serde(default)]
    pub yolo: bool,
}

impl ProviderConfigOverride {
    /// The override for `model_id`, matching either the requested id or the
    /// canonical catalogue id it resolved to.
    pub fn model(&self, model_id: &str, canonical: Option<&str>) -> Option<&ModelOverride> {
        self.models
            .iter()
            .find(|m| m.id == model_id)
            .or_else(|| canonical.and_then(|c| self.models.iter().find(|m| m.id == c)))
    }
}

// ---------------------------------------------------------------------------
// ConfigWarning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Default per-invocation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Directory of helper scripts prepended to `PATH` for provider processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub providers: HashMap<String, ProviderConfigOverride>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let settings: Settings =
            serde_yaml::from_str(&data).map_err(|e| ReviewAgentError::Config {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(settings.rooted_at(path.parent()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfigOverride> {
        self.providers.get(id)
    }

    /// Relative `bin_dir` paths are resolved against the settings file's directory.
    fn rooted_at(mut self, dir: Option<&Path>) -> Self {
        if let (Some(bin), Some(dir)) = (&self.bin_dir, dir) {
            if bin.is_relative() {
                self.bin_dir = Some(dir.join(bin));
            }
        }
        self
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, known: &[ProviderDefinition]) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (id, cfg) in &self.providers {
            let Some(def) = known.iter().find(|p| &p.id == id) else {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown provider '{id}' in providers"),
                });
                continue;
            };

            if let Some(cmd) = &cfg.command {
                if cmd.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("providers.{id}.command is empty"),
                    });
                }
            }

            for model in &cfg.models {
                if model.id.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("providers.{id}.models has an entry without an id"),
                    });
                } else if def.find_model(&model.id).is_none() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "model '{}' is not in the {} catalogue; its id is passed through as-is",
                            model.id, def.name
                        ),
                    });
                }
            }
        }

        if self.timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_providers;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
timeout_secs: 120
bin_dir: bin
providers:
  claude:
    command: /opt/claude/bin/claude
    extra_args: ["--max-turns", "40"]
    env:
      ANTHROPIC_LOG: debug
    yolo: true
    models:
      - id: opus
        cli_model: claude-opus-4-1
        env:
          EFFORT_LEVEL: max
      - id: sonnet
        cli_model: null
"#;

    #[test]
    fn parses_full_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(120));
        assert_eq!(settings.bin_dir, Some(dir.path().join("bin")));

        let claude = settings.provider("claude").unwrap();
        assert!(claude.yolo);
        assert_eq!(claude.command.as_deref(), Some("/opt/claude/bin/claude"));
        assert_eq!(claude.extra_args, vec!["--max-turns", "40"]);

        let opus = claude.model("opus", None).unwrap();
        assert_eq!(opus.cli_model, CliModel::Name("claude-opus-4-1".into()));
        assert_eq!(opus.env.get("EFFORT_LEVEL").map(String::as_str), Some("max"));
        assert_eq!(claude.model("sonnet", None).unwrap().cli_model, CliModel::Suppress);
    }

    #[test]
    fn override_matches_canonical_id_for_alias() {
        let cfg = ProviderConfigOverride {
            models: vec![ModelOverride {
                id: "opus".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(cfg.model("claude-opus-4-1", Some("opus")).is_some());
        assert!(cfg.model("claude-opus-4-1", None).is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("nope.yaml")).unwrap();
        assert!(settings.providers.is_empty());
        assert_eq!(settings.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "providers: [1, 2").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(
            matches!(&err, ReviewAgentError::Config { path, .. } if path.ends_with("bad.yaml")),
            "{err:?}"
        );
    }

    #[test]
    fn validate_flags_unknown_provider_and_zero_timeout() {
        let settings: Settings =
            serde_yaml::from_str("timeout_secs: 0\nproviders:\n  nope: {}\n").unwrap();
        let warnings = settings.validate(&builtin_providers());
        assert!(warnings.iter().any(|w| w.message.contains("unknown provider 'nope'")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("timeout_secs")));
    }

    #[test]
    fn validate_accepts_sample() {
        let settings: Settings = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(settings.validate(&builtin_providers()).is_empty());
    }
}
