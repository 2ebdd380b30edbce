//! Vaultsort CLI - Password vault categorizer
//!
//! Usage:
//!   vaultsort classify -i export.json -o sorted.csv   Classify a vault export
//!   vaultsort categories                              List the category set
//!   vaultsort prompts show                            Show the classification prompt
//!   vaultsort check                                   Check the model provider

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    // API keys may live in a .env file; already-set variables win
    if dotenvy::dotenv().is_err() {
        debug!("No .env file loaded");
    }

    match cli.command {
        Commands::Classify(args) => commands::cmd_classify(&args).await,
        Commands::Categories => commands::cmd_categories(),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::Show) => commands::cmd_prompts_show(),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Check { provider } => commands::cmd_check(&provider).await,
    }
}
