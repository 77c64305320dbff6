mod cmd;
mod output;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use review_agent::{CancellationRegistry, ProviderRegistry};
use tracing::warn;

use cmd::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "review-agent",
    about = "Run AI coding-agent CLIs as code reviewers and collect their JSON verdicts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Settings file (default: ./.review-agent.yaml, then ~/.review-agent/config.yaml)
    #[arg(long, global = true, env = "REVIEW_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known providers and their models
    Providers,

    /// Show the exact command a provider/model pair would launch
    Resolve {
        #[arg(long)]
        provider: String,
        /// Model id or alias (default: the provider's default model)
        #[arg(long)]
        model: Option<String>,
    },

    /// Probe whether provider CLIs are installed
    Check {
        /// Only probe this provider (fails when it is unavailable)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Parse captured provider output into its JSON payload
    Extract {
        /// Provider whose output format to parse
        #[arg(long)]
        provider: String,
        /// Captured stdout (default: read stdin)
        file: Option<PathBuf>,
    },

    /// Run one or more reviewers over a prompt
    Run(RunArgs),

    /// Validate the settings file for common mistakes
    Validate,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = settings::load(cli.config.as_deref()).and_then(|settings| {
        let registry =
            ProviderRegistry::from_process_env(settings, Arc::new(CancellationRegistry::new()));

        if !matches!(cli.command, Commands::Validate) {
            for w in registry.settings().validate(registry.providers()) {
                warn!("{}", w.message);
            }
        }

        match cli.command {
            Commands::Providers => cmd::providers::run(&registry, cli.json),
            Commands::Resolve { provider, model } => {
                cmd::resolve::run(&registry, &provider, model.as_deref(), cli.json)
            }
            Commands::Check { provider } => {
                cmd::check::run(&registry, provider.as_deref(), cli.json)
            }
            Commands::Extract { provider, file } => {
                cmd::extract::run(&registry, &provider, file.as_deref(), cli.json)
            }
            Commands::Run(args) => cmd::run::run(&registry, args, cli.json),
            Commands::Validate => cmd::validate::run(&registry, cli.json),
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
