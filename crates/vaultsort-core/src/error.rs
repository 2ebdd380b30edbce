//! Error types for vaultsort

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad CLI flags or config file. Fatal, raised before any processing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed vault export or domain map. Fatal, raised before any processing.
    #[error("Input format error: {0}")]
    InputFormat(String),

    /// A whole-batch failure talking to the model. Retried, then absorbed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed per-item model output. Absorbed into a fallback classification.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The merge invariant was violated. Indicates a defect.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Failure of a single chat completion request
///
/// Every variant is retryable; the retry policy decides when to give up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unparsable response: {0}")]
    Envelope(String),
}

impl TransportError {
    /// Server-suggested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Envelope(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
