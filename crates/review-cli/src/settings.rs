use std::path::{Path, PathBuf};

use anyhow::Context;
use review_agent::Settings;
use tracing::debug;

/// Per-project settings file, looked up in the working directory.
pub const LOCAL_FILE: &str = ".review-agent.yaml";

/// Locate the settings file.
///
/// Priority:
/// 1. `--config` flag / `REVIEW_AGENT_CONFIG` env var (passed in as `explicit`)
/// 2. `.review-agent.yaml` in `cwd`
/// 3. `~/.review-agent/config.yaml`
///
/// `None` means built-in defaults.
pub fn locate(explicit: Option<&Path>, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    let local = cwd.join(LOCAL_FILE);
    if local.is_file() {
        return Some(local);
    }

    let global = home?.join(".review-agent").join("config.yaml");
    global.is_file().then_some(global)
}

/// Load settings from the first location that exists. An explicit path that
/// does not exist is an error.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home = home::home_dir();

    let Some(path) = locate(explicit, &cwd, home.as_deref()) else {
        debug!("no settings file; using defaults");
        return Ok(Settings::default());
    };

    let settings = Settings::load(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}
