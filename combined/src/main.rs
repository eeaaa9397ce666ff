//! Resource admin CLI - runs data provider operations from the shell.
//!
//! Configuration comes from the environment (see `ProviderConfig::from_env`);
//! results are printed to stdout as JSON, logs go to stderr.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use common::{init_tracing, AppResult, ProviderConfig};
use data_provider::ProviderFactory;

use crate::cli::Cli;

async fn run(cli: Cli) -> AppResult<()> {
    let mut config = ProviderConfig::from_env()?;
    if let Some(provider) = cli.provider {
        config.provider_type = provider;
    }
    if cli.no_delay {
        config.local.delay_ms = 0;
        config.local.jitter_ms = 0;
    }
    tracing::debug!(?config, "Loaded provider configuration");

    let factory = ProviderFactory::new();
    let handle = factory.get_instance(&config).await?;

    let output = commands::execute(cli.command, &handle).await?;
    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| common::AppError::internal(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code(), "{}", e);
            eprintln!("error [{}]: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}
