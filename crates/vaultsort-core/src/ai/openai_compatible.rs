//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenRouter (https://openrouter.ai/api/v1)
//! - Requesty (https://router.requesty.ai/v1)
//! - vLLM, LocalAI, llama-server and similar self-hosted servers
//!
//! The base URL includes the API version segment; requests go to
//! `{base_url}/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClassifierConfig, Provider};
use crate::error::{Error, Result, TransportError};
use crate::text::truncate;

use super::{AIBackend, TransportResult};

/// Sent to OpenRouter so requests are attributed to this tool
const APP_URL: &str = "https://github.com/vaultsort/vaultsort";
const APP_TITLE: &str = "vaultsort";

/// Longest error body kept in a transport error
const MAX_ERROR_BODY: usize = 500;

/// OpenAI-compatible backend
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    extra_headers: HeaderMap,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: 0.1,
            extra_headers: HeaderMap::new(),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Build a backend from the classifier config and an API key
    pub fn from_config(config: &ClassifierConfig, api_key: Option<String>) -> Result<Self> {
        let http_client = build_client(config.timeout)?;

        let mut extra_headers = HeaderMap::new();
        if config.provider == Provider::OpenRouter {
            extra_headers.insert(
                HeaderName::from_static("http-referer"),
                HeaderValue::from_static(APP_URL),
            );
            extra_headers.insert(
                HeaderName::from_static("x-title"),
                HeaderValue::from_static(APP_TITLE),
            );
        }

        Ok(Self {
            http_client,
            base_url: config.endpoint()?,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            extra_headers,
        })
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Use a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = build_client(timeout)?;
        Ok(self)
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str) -> TransportResult<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(self.temperature),
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.extra_headers.clone())
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header(AUTHORIZATION, format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            return Err(TransportError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let body = response.text().await?;
        let chat_response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::Envelope(format!("invalid completion body: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::Envelope("completion has no message content".into()))
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Seconds form of `Retry-After`; HTTP dates are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &str) -> TransportResult<String> {
        debug!(model = %self.model, chars = prompt.len(), "Sending chat completion");
        let reply = self.chat_completion(prompt).await?;
        debug!("OpenAI-compatible response: {}", reply);
        Ok(reply)
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self
            .http_client
            .get(format!("{}/models", self.base_url))
            .headers(self.extra_headers.clone());
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header(AUTHORIZATION, format!("Bearer {}", api_key));
        }

        match req_builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
