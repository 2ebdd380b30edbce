//! Provider reachability check

use anyhow::{bail, Result};
use vaultsort_core::{AIBackend, AIClient};

use super::load_config;
use crate::cli::ProviderArgs;

/// Show the effective provider settings and probe the endpoint
pub async fn cmd_check(args: &ProviderArgs) -> Result<()> {
    let config = load_config(args)?;
    config.validate()?;
    let client = AIClient::from_config(&config)?;

    println!("Provider: {}", config.provider);
    println!("Model:    {}", client.model());
    println!("Endpoint: {}", client.host());
    println!(
        "Batching: {} items per request, {} in flight, {} retries",
        config.batch_size, config.concurrency, config.max_retries
    );

    if client.health_check().await {
        println!("\n✓ Provider is reachable");
        Ok(())
    } else {
        bail!("Provider at {} is not reachable", client.host())
    }
}
