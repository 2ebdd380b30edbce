//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Vaultsort - Categorize password vault items
#[derive(Parser)]
#[command(name = "vaultsort")]
#[command(about = "Sort a password vault export into categories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a vault export and write a categorized CSV
    Classify(ClassifyArgs),

    /// List the fixed category set
    Categories,

    /// Inspect the classification prompt
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Check that the configured model provider is reachable
    Check {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

/// Provider selection shared by commands that talk to a model
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderArgs {
    /// Config file (defaults to the data directory override, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Provider: openrouter, requesty, openai_compatible, mock
    #[arg(long)]
    pub provider: Option<String>,

    /// Base URL of an OpenAI-style API (e.g. http://localhost:8000/v1)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Model name sent to the provider
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Unencrypted JSON vault export
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Items per model request
    #[arg(short, long, allow_negative_numbers = true)]
    pub batch_size: Option<i64>,

    /// Maximum batch requests in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries per batch after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Stop sending requests after this many seconds; unfinished items fall back
    #[arg(long)]
    pub run_timeout_secs: Option<u64>,

    /// YAML or JSON list of {domain, folder} entries classified without the model
    #[arg(long)]
    pub domain_folder_map: Option<PathBuf>,

    /// Write the category into the folder column
    #[arg(long)]
    pub category_as_folder: bool,

    /// Send one item per domain and copy its result to the rest
    #[arg(long)]
    pub reuse_domain_results: bool,

    /// Classify items on private IPs or localhost as Personal/Homelab
    #[arg(long)]
    pub detect_homelab: bool,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// Show the effective classification prompt
    Show,

    /// Show the path where prompt overrides should be placed
    Path,
}
