use futures::future::join_all;
use review_agent::ProviderRegistry;
use serde::Serialize;

use crate::output::{print_json, print_table};

#[derive(Serialize)]
struct Availability {
    provider: String,
    command: String,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    install_instructions: Option<String>,
}

pub fn run(registry: &ProviderRegistry, only: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ids: Vec<String> = match only {
        Some(id) => vec![registry.get_provider_class(id)?.id.clone()],
        None => registry.providers().iter().map(|d| d.id.clone()).collect(),
    };
    let providers = ids
        .iter()
        .map(|id| registry.create_provider(id, None))
        .collect::<Result<Vec<_>, _>>()?;

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(join_all(providers.iter().map(|p| p.test_availability())));

    let report: Vec<Availability> = providers
        .iter()
        .zip(results)
        .map(|(p, available)| Availability {
            provider: p.id().to_string(),
            command: p.invocation().command().to_string(),
            available,
            install_instructions: (!available)
                .then(|| p.definition().install_instructions.clone()),
        })
        .collect();

    if json {
        print_json(&report)?;
    } else {
        let rows: Vec<Vec<String>> = report
            .iter()
            .map(|a| {
                vec![
                    a.provider.clone(),
                    a.command.clone(),
                    if a.available { "ok" } else { "missing" }.to_string(),
                ]
            })
            .collect();
        print_table(&["PROVIDER", "COMMAND", "STATUS"], &rows);
        for a in report.iter().filter(|a| !a.available) {
            if let Some(hint) = &a.install_instructions {
                println!("\n{}: {hint}", a.provider);
            }
        }
    }

    if let Some(id) = only {
        if report.iter().any(|a| !a.available) {
            anyhow::bail!("{id} is not available");
        }
    }
    Ok(())
}
