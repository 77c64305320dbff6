use std::path::Path;

use review_agent::{parse_response, ProviderRegistry, ReviewAgentError};

use crate::cmd::read_input;
use crate::output::print_json;

/// Parse captured stdout the way `run` would, without the fallback model.
pub fn run(
    registry: &ProviderRegistry,
    provider_id: &str,
    file: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let def = registry.get_provider_class(provider_id)?;
    let raw = read_input(file)?;
    let result = parse_response(def.format, &raw);

    if json {
        print_json(&result)?;
    } else if let Some(data) = &result.data {
        print_json(data)?;
    }

    if !result.success {
        let reason = result
            .error
            .unwrap_or_else(|| "no JSON payload found".to_string());
        return Err(ReviewAgentError::MalformedOutput(reason).into());
    }
    Ok(())
}
