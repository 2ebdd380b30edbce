//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `classify` - Classify a vault export and shared config resolution
//! - `categories` - List the fixed category set
//! - `prompts` - Prompt library inspection
//! - `check` - Provider reachability check

pub mod categories;
pub mod check;
pub mod classify;
pub mod prompts;

// Re-export command functions for main.rs
pub use categories::*;
pub use check::*;
pub use classify::*;
pub use prompts::*;
