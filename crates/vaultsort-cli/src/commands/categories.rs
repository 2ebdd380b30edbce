//! Category listing

use anyhow::Result;
use vaultsort_core::Category;

/// List the fixed category set the model chooses from
pub fn cmd_categories() -> Result<()> {
    println!("Categories:\n");
    for category in category_labels() {
        println!("  {}", category);
    }
    println!();
    println!("Items the model cannot place are marked {}.", Category::Uncategorized);
    println!("Folders from --domain-folder-map are used as-is.");
    Ok(())
}

/// Labels in presentation order
pub fn category_labels() -> Vec<&'static str> {
    Category::fixed().iter().map(|c| c.label()).collect()
}
