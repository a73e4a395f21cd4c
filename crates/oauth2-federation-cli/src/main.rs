mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use oauth2_federation::config::FederationConfig;
use oauth2_federation::config::loader::load_config;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(if cli.verbose { "debug" } else { "warn" });

    let config = load(&cli)?;
    tracing::debug!(
        file = %cli.config.display(),
        provider = %config.provider.name,
        "Configuration loaded"
    );

    match &cli.command {
        Commands::CheckConfig => commands::check_config::run(&config)?,
        Commands::Proof(args) => commands::proof::run(&config, args),
        Commands::Query(args) => commands::query::run(&config, args).await?,
    }
    Ok(())
}

fn load(cli: &Cli) -> Result<FederationConfig> {
    load_config(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))
}
