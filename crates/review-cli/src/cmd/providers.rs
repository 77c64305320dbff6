use review_agent::ProviderRegistry;

use crate::output::{print_json, print_table};

pub fn run(registry: &ProviderRegistry, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(registry.providers());
    }

    let mut rows = Vec::new();
    for def in registry.providers() {
        let provider = registry.create_provider(&def.id, None)?;
        let models: Vec<String> = def
            .models
            .iter()
            .map(|m| {
                if m.id == def.default_model {
                    format!("{}*", m.id)
                } else {
                    m.id.clone()
                }
            })
            .collect();
        rows.push(vec![
            def.id.clone(),
            def.name.clone(),
            provider.invocation().command().to_string(),
            models.join(", "),
            if def.supports_extraction { "yes" } else { "no" }.to_string(),
        ]);
    }

    print_table(&["ID", "NAME", "COMMAND", "MODELS", "EXTRACTION"], &rows);
    println!("\n* default model");
    Ok(())
}
