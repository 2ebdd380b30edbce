//! Classifier configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, else the override in the data dir
//!    (~/.local/share/vaultsort/config/classifier.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Override files only need the keys they change. API keys are read from
//! the environment, never from the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::ai::RetryPolicy;
use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/classifier.toml");

/// Model provider to send batches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenRouter,
    Requesty,
    /// Any server implementing `/chat/completions` (vLLM, LocalAI, ...)
    OpenAICompatible,
    /// Offline keyword classifier
    Mock,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::Requesty => "requesty",
            Self::OpenAICompatible => "openai_compatible",
            Self::Mock => "mock",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "requesty" => Ok(Self::Requesty),
            "openai_compatible" | "openai" => Ok(Self::OpenAICompatible),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Configuration(format!(
                "Unknown provider '{}' (expected openrouter, requesty, openai_compatible or mock)",
                other
            ))),
        }
    }

    /// Endpoint used when no base URL is configured
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Requesty => Some("https://router.requesty.ai/v1"),
            Self::OpenAICompatible | Self::Mock => None,
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Requesty => Some("REQUESTY_API_KEY"),
            Self::OpenAICompatible => Some("OPENAI_COMPATIBLE_API_KEY"),
            Self::Mock => None,
        }
    }

    /// Whether a missing API key is a configuration error
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenRouter | Self::Requesty)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effective classifier settings
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub provider: Provider,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub temperature: f32,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Kept signed so a bad value from a flag or file reaches validation
    pub batch_size: i64,
    pub concurrency: usize,
    /// Whole-run deadline
    pub run_timeout: Option<Duration>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenRouter,
            base_url: None,
            model: "anthropic/claude-3-haiku".to_string(),
            timeout: Duration::from_secs(60),
            temperature: 0.1,
            max_retries: 2,
            initial_backoff: Duration::from_millis(2000),
            max_backoff: Duration::from_secs(30),
            batch_size: 10,
            concurrency: 4,
            run_timeout: None,
        }
    }
}

impl ClassifierConfig {
    /// Load embedded defaults, then apply the override file
    ///
    /// An explicit path must exist. Without one, the data-dir override is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_toml(DEFAULT_CONFIG)?;

        let override_path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Configuration(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        if let Some(path) = override_path {
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Configuration(format!("Failed to read config: {}", e)))?;
            config.apply_toml(&content)?;
            debug!(path = %path.display(), "Applied config override");
        }

        Ok(config)
    }

    /// Parse a complete config on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_toml(content)?;
        Ok(config)
    }

    /// Apply every key present in `content`
    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Invalid config TOML: {}", e)))?;

        if let Some(provider) = raw.provider {
            if let Some(name) = provider.name {
                self.provider = Provider::parse(&name)?;
            }
            if let Some(base_url) = provider.base_url {
                self.base_url = Some(base_url).filter(|u| !u.trim().is_empty());
            }
            if let Some(model) = provider.model {
                self.model = model;
            }
        }

        if let Some(request) = raw.request {
            if let Some(timeout) = request.timeout_secs {
                self.timeout = Duration::from_secs(timeout);
            }
            if let Some(temperature) = request.temperature {
                self.temperature = temperature;
            }
        }

        if let Some(retry) = raw.retry {
            if let Some(retries) = retry.max_retries {
                self.max_retries = retries;
            }
            if let Some(ms) = retry.initial_backoff_ms {
                self.initial_backoff = Duration::from_millis(ms);
            }
            if let Some(ms) = retry.max_backoff_ms {
                self.max_backoff = Duration::from_millis(ms);
            }
        }

        if let Some(batching) = raw.batching {
            if let Some(size) = batching.batch_size {
                self.batch_size = size;
            }
            if let Some(concurrency) = batching.concurrency {
                self.concurrency = concurrency;
            }
            if let Some(secs) = batching.run_timeout_secs {
                self.run_timeout = Some(Duration::from_secs(secs));
            }
        }

        Ok(())
    }

    /// Reject values that cannot produce a working run
    pub fn validate(&self) -> Result<()> {
        crate::batch::validate_batch_size(self.batch_size)?;
        if self.concurrency == 0 {
            return Err(Error::Configuration(
                "Concurrency must be greater than 0".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Configuration("Model name must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "Request timeout must be greater than 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Configuration(format!(
                "Temperature must be between 0 and 2 (got {})",
                self.temperature
            )));
        }
        if self.provider != Provider::Mock {
            self.endpoint()?;
        }
        Ok(())
    }

    /// Base URL requests are sent to, without a trailing slash
    pub fn endpoint(&self) -> Result<String> {
        let url = match (&self.base_url, self.provider.default_base_url()) {
            (Some(url), _) => url.clone(),
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                return Err(Error::Configuration(format!(
                    "Provider {} needs a base URL (set --base-url or [provider] base_url)",
                    self.provider
                )))
            }
        };
        Url::parse(&url)
            .map_err(|e| Error::Configuration(format!("Invalid base URL '{}': {}", url, e)))?;
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Read the provider's API key from the process environment
    pub fn api_key(&self) -> Result<Option<String>> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    /// Resolve the API key through `lookup`
    pub fn api_key_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Option<String>> {
        let Some(var) = self.provider.api_key_env() else {
            return Ok(None);
        };
        match lookup(var).filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Some(key)),
            None if self.provider.requires_api_key() => Err(Error::Configuration(format!(
                "{} is not set (required for provider {})",
                var, self.provider
            ))),
            None => Ok(None),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("vaultsort").join("config").join("classifier.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    provider: Option<RawProvider>,
    request: Option<RawRequest>,
    retry: Option<RawRetry>,
    batching: Option<RawBatching>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProvider {
    name: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetry {
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBatching {
    batch_size: Option<i64>,
    concurrency: Option<usize>,
    run_timeout_secs: Option<u64>,
}
