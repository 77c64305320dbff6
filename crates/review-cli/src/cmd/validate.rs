use review_agent::{ProviderRegistry, WarnLevel};

use crate::output::print_json;

pub fn run(registry: &ProviderRegistry, json: bool) -> anyhow::Result<()> {
    let warnings = registry.settings().validate(registry.providers());

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Settings are valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("settings validation found errors");
    }
    Ok(())
}
