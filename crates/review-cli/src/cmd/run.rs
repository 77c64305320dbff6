use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use review_agent::{
    NormalizedStreamEvent, ProgressSink, ProviderRegistry, ProviderResponse, ReviewRun, Voice,
    VoiceOutcome,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::cmd::read_input;
use crate::output::print_json;

#[derive(Args)]
pub struct RunArgs {
    /// Reviewer as PROVIDER[:MODEL]; repeat for several
    #[arg(long = "voice", required = true, value_name = "PROVIDER[:MODEL]")]
    pub voices: Vec<Voice>,

    /// Read the prompt from this file (default: stdin)
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Working directory for the provider processes
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Per-voice timeout (default: settings `timeout_secs`, else 300)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Print live progress on stderr
    #[arg(long)]
    pub stream: bool,
}

pub fn run(registry: &ProviderRegistry, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let prompt = read_input(args.prompt_file.as_deref())?;
    if prompt.trim().is_empty() {
        anyhow::bail!("prompt is empty");
    }

    let mut opts = registry.execution_options();
    if let Some(secs) = args.timeout_secs {
        opts.timeout = Duration::from_secs(secs);
    }
    opts.cwd = args.cwd;

    let mut review =
        ReviewRun::new(registry, args.voices).context("failed to prepare review run")?;
    if args.stream {
        review = review.on_progress(Arc::new(|voice: &Voice| {
            let label = voice.to_string();
            Arc::new(move |ev: &NormalizedStreamEvent| -> review_agent::Result<()> {
                eprintln!("[{label}] {}", ev.text);
                Ok(())
            }) as Arc<dyn ProgressSink>
        }));
    }

    let rt = tokio::runtime::Runtime::new()?;
    let outcomes = rt.block_on(async {
        let execution = review.execute(&prompt, &opts);
        tokio::pin!(execution);
        tokio::select! {
            outcomes = &mut execution => outcomes,
            _ = tokio::signal::ctrl_c() => {
                let signalled = review.cancel();
                warn!(run_id = review.run_id(), signalled, "interrupted; cancelling reviewers");
                execution.await
            }
        }
    });

    if json {
        let report: Vec<Value> = outcomes.iter().map(outcome_json).collect();
        print_json(&report)?;
    } else {
        for outcome in &outcomes {
            print_outcome(outcome)?;
        }
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} reviewers failed", outcomes.len());
    }
    Ok(())
}

fn outcome_json(outcome: &VoiceOutcome) -> Value {
    match &outcome.result {
        Ok(response) => json!({
            "voice": outcome.voice.to_string(),
            "analysis_id": outcome.analysis_id,
            "response": response,
        }),
        Err(e) => json!({
            "voice": outcome.voice.to_string(),
            "analysis_id": outcome.analysis_id,
            "error": e.to_string(),
            "cancelled": e.is_cancelled(),
        }),
    }
}

fn print_outcome(outcome: &VoiceOutcome) -> anyhow::Result<()> {
    println!("=== {} ===", outcome.voice);
    match &outcome.result {
        Ok(ProviderResponse::Parsed { data, .. }) => print_json(data)?,
        Ok(ProviderResponse::Unparsed { raw, error }) => {
            println!(
                "(no JSON payload: {})",
                error.as_deref().unwrap_or("extraction skipped")
            );
            println!("{}", raw.trim_end());
        }
        Err(e) => println!("error: {e}"),
    }
    println!();
    Ok(())
}
