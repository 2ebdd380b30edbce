//! Classify command and config resolution

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vaultsort_core::{
    export::validate_output_path, load_domain_map, load_records, text::truncate, write_rows,
    AIClient, Cancellation, Categorizer, ClassifierConfig, DeterministicMatcher, PipelineSettings,
    Provider, RunOutput, RunReport,
};

use crate::cli::{ClassifyArgs, ProviderArgs};

/// Fallback reasons listed after a run
const MAX_FALLBACKS_SHOWN: usize = 10;

/// Load the config file and apply provider flags on top
pub fn load_config(args: &ProviderArgs) -> Result<ClassifierConfig> {
    let mut config = ClassifierConfig::load(args.config.as_deref())?;

    if let Some(ref name) = args.provider {
        config.provider = Provider::parse(name)?;
    }
    if let Some(ref url) = args.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(ref model) = args.model {
        config.model = model.clone();
    }

    Ok(config)
}

/// Effective config for a classify run
pub fn classify_config(args: &ClassifyArgs) -> Result<ClassifierConfig> {
    let mut config = load_config(&args.provider)?;

    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(retries) = args.max_retries {
        config.max_retries = retries;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.run_timeout_secs {
        config.run_timeout = Some(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

/// Run a classification from input file to output file
///
/// Every configuration and input problem is reported before any request is
/// sent, and the output file only appears once the run has finished.
pub async fn classify_file(args: &ClassifyArgs, cancel: &Cancellation) -> Result<RunOutput> {
    let config = classify_config(args)?;
    validate_output_path(&args.output)?;

    let records = load_records(&args.input)
        .with_context(|| format!("Failed to load vault export {}", args.input.display()))?;
    let map = load_domain_map(args.domain_folder_map.as_deref())
        .context("Failed to load domain-folder map")?;
    info!(
        items = records.len(),
        rules = map.len(),
        "Loaded {}",
        args.input.display()
    );

    let client = AIClient::from_config(&config)?;
    let matcher = DeterministicMatcher::new(map).with_homelab_detection(args.detect_homelab);

    let mut settings = PipelineSettings::from_config(&config);
    settings.reuse_domain_results = args.reuse_domain_results;
    settings.export.category_as_folder = args.category_as_folder;

    let mut categorizer = Categorizer::new(client, matcher, settings)?;
    let output = categorizer.run(&records, cancel).await?;

    write_rows(&args.output, &output.rows)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    Ok(output)
}

/// Classify a vault export, stopping early on Ctrl-C
pub async fn cmd_classify(args: &ClassifyArgs) -> Result<()> {
    let cancel = Cancellation::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; remaining items will be left uncategorized");
                cancel.cancel("interrupted");
            }
        })
    };

    let result = classify_file(args, &cancel).await;
    interrupt.abort();
    let output = result?;

    print_summary(&output, &args.output);
    Ok(())
}

fn print_summary(output: &RunOutput, path: &Path) {
    let report = &output.report;

    println!();
    println!("Wrote {} items to {}", report.total, path.display());
    print_report(report);

    let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &output.rows {
        *by_category.entry(row.category.as_str()).or_default() += 1;
    }
    let mut counts: Vec<_> = by_category.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    if !counts.is_empty() {
        println!();
        println!("{:<30} {:>6}", "CATEGORY", "ITEMS");
        println!("{}", "-".repeat(37));
        for (category, count) in counts {
            println!("{:<30} {:>6}", truncate(category, 30), count);
        }
    }

    let fallbacks: Vec<_> = output
        .classifications
        .iter()
        .filter(|c| c.is_fallback())
        .collect();
    if !fallbacks.is_empty() {
        println!();
        println!("Uncategorized items:");
        for c in fallbacks.iter().take(MAX_FALLBACKS_SHOWN) {
            println!("  {:<38} {}", truncate(&c.item_id, 38), truncate(&c.reason, 60));
        }
        if fallbacks.len() > MAX_FALLBACKS_SHOWN {
            println!("  ... and {} more", fallbacks.len() - MAX_FALLBACKS_SHOWN);
        }
    }
}

/// Print run counts
pub fn print_report(report: &RunReport) {
    println!("  Mapped without model: {}", report.deterministic);
    println!("  Classified by model:  {}", report.model);
    if report.reused > 0 {
        println!("    (reused by domain:  {})", report.reused);
    }
    println!("  Uncategorized:        {}", report.fallback);
    println!(
        "  Batches sent:         {} ({} retries)",
        report.batches, report.retries
    );
    if report.cancelled {
        println!(
            "  Run cancelled:        {}",
            report.cancel_reason.as_deref().unwrap_or("yes")
        );
    }
}
