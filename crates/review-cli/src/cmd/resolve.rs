use anyhow::Context;
use review_agent::ProviderRegistry;
use serde_json::json;

use crate::output::print_json;

pub fn run(
    registry: &ProviderRegistry,
    provider_id: &str,
    model: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let provider = registry
        .create_provider(provider_id, model)
        .with_context(|| format!("cannot resolve provider '{provider_id}'"))?;
    let resolver = registry.resolver(provider_id)?;
    let cli_model = resolver.cli_model(provider.model());
    let invocation = provider.invocation();

    if json {
        let value = json!({
            "provider": provider.id(),
            "model": provider.model(),
            "cli_model": cli_model,
            "format": provider.definition().format,
            "invocation": invocation,
            "extraction": provider.extraction_invocation(),
        });
        return print_json(&value);
    }

    println!("provider:   {}", provider.id());
    println!("model:      {}", provider.model());
    println!(
        "cli model:  {}",
        cli_model.as_deref().unwrap_or("(flag omitted)")
    );
    println!("command:    {}", invocation.display_command());
    if invocation.use_shell() {
        println!("            (runs through the shell)");
    }
    for (key, value) in invocation.env() {
        println!("env:        {key}={value}");
    }
    match provider.extraction_invocation() {
        Some(extract) => println!("extraction: {}", extract.display_command()),
        None => println!("extraction: (not supported)"),
    }
    Ok(())
}
