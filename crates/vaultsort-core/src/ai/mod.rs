//! Pluggable model backend abstraction
//!
//! This module provides a backend-agnostic interface for sending
//! classification prompts to a chat model.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all backends
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//! - `parsing`: turns a raw reply into per-item classifications
//! - `retry`: the per-batch retry-then-fallback state machine
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = ClassifierConfig::load(None)?;
//! let client = AIClient::from_config(&config)?;
//! let reply = client.complete(&prompt).await?;
//! ```

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod retry;

pub use mock::{classify_item, reply_for_prompt, MockBackend};
pub use openai_compatible::OpenAICompatibleBackend;
pub use parsing::{fallback_batch, parse_batch_response, resolve_batch};
pub use retry::{BatchState, RetryPolicy};

use async_trait::async_trait;
use tracing::info;

use crate::config::{ClassifierConfig, Provider};
use crate::error::{Result, TransportError};

/// Result of a single model request
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Trait defining the interface for all model backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send one rendered prompt and return the reply text
    async fn complete(&self, prompt: &str) -> TransportResult<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenRouter, Requesty or any other chat completions server
    OpenAICompatible(OpenAICompatibleBackend),
    /// Offline keyword classifier
    Mock(MockBackend),
}

impl AIClient {
    /// Create a client for the configured provider
    ///
    /// Reads the provider's API key from the environment; a missing key for
    /// a provider that needs one is a configuration error.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let client = match config.provider {
            Provider::Mock => AIClient::Mock(MockBackend::new()),
            _ => {
                let api_key = config.api_key()?;
                AIClient::OpenAICompatible(OpenAICompatibleBackend::from_config(config, api_key)?)
            }
        };
        info!(
            provider = %config.provider,
            model = %client.model(),
            host = %client.host(),
            "Using model backend"
        );
        Ok(client)
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn complete(&self, prompt: &str) -> TransportResult<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(prompt).await,
            AIClient::Mock(b) => b.complete(prompt).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
