//! Prompts-related command implementations

use anyhow::Result;
use vaultsort_core::prompts::{PromptId, PromptLibrary};

/// Show the classification prompt that a run would use
pub fn cmd_prompts_show() -> Result<()> {
    let mut library = PromptLibrary::new();
    let id = PromptId::ClassifyVaultItems;
    let prompt = library.get(id)?;

    println!("Prompt: {}", prompt.metadata.id);
    println!("Version: {}", prompt.metadata.version);
    println!("Task Type: {}", prompt.metadata.task_type);
    println!(
        "Source: {}",
        if prompt.is_override {
            "Override"
        } else {
            "Default"
        }
    );

    if let Some(ref path) = prompt.override_path {
        println!("Override Path: {}", path.display());
    }

    println!();
    println!("--- Content ---");
    println!("{}", prompt.content);

    Ok(())
}

/// Show the path where prompt overrides should be placed
pub fn cmd_prompts_path() -> Result<()> {
    let library = PromptLibrary::new();
    match library.override_dir() {
        Some(dir) => {
            if let Some(path) = library.override_path(PromptId::ClassifyVaultItems) {
                println!("{}", path.display());
            }

            if !dir.exists() {
                eprintln!();
                eprintln!("Note: This directory does not exist yet.");
                eprintln!("Create it and copy the default prompt there to customize it.");
            }
        }
        None => {
            eprintln!("Could not determine prompts directory.");
            eprintln!("The data directory is not available on this system.");
        }
    }

    Ok(())
}
