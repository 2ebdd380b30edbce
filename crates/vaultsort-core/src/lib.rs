//! Vaultsort Core Library
//!
//! Shared functionality for the vaultsort password vault categorizer:
//! - Bitwarden JSON export loading
//! - Deterministic domain-folder and homelab matching
//! - Pluggable chat model backends (OpenRouter, Requesty, any OpenAI-style server)
//! - Prompt library for customizable classification prompts
//! - Concurrent batch classification with retry and fallback
//! - Categorized CSV export

pub mod ai;
pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod rules;
pub mod text;
pub mod vault;

/// Test utilities including a mock chat-completions server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, BatchState, MockBackend, OpenAICompatibleBackend, RetryPolicy};
pub use batch::{batches, Batches};
pub use config::{ClassifierConfig, Provider};
pub use error::{Error, Result, TransportError};
pub use export::{write_rows, ExportOptions, OutputRow};
pub use merge::merge_classifications;
pub use models::{Category, Classification, ClassificationSource, DomainFolderRule, ItemType, Record};
pub use pipeline::{Cancellation, Categorizer, PipelineSettings, RunOutput, RunReport};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use rules::{load_domain_map, DeterministicMatcher, DomainFolderMap};
pub use vault::load_records;
