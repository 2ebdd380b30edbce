//! Retry-then-fallback state machine for one batch
//!
//! ```text
//! Pending -> Requested -> Succeeded
//!                |
//!                +-> RetryScheduled -> Requested -> ...
//!                |
//!                +-> Fallback   (retries exhausted or run cancelled)
//! ```
//!
//! The machine only decides what happens next. Sending requests and
//! sleeping between attempts is the caller's job.

use std::time::Duration;

use crate::error::TransportError;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(2000),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    ///
    /// Doubles per attempt up to `max_backoff`. A longer server `Retry-After`
    /// wins, but never past `max_backoff`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        match retry_after {
            Some(wait) if wait > backoff => wait.min(self.max_backoff),
            _ => backoff,
        }
    }
}

/// Where a batch is in its request lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Requested {
        attempt: u32,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        cause: TransportError,
    },
    Succeeded {
        attempts: u32,
    },
    Fallback {
        attempts: u32,
        reason: String,
    },
}

impl BatchState {
    /// Issue the next request
    pub fn send(self) -> Self {
        match self {
            Self::Pending => Self::Requested { attempt: 1 },
            Self::RetryScheduled { attempt, .. } => Self::Requested {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// The in-flight request returned a usable reply
    pub fn succeed(self) -> Self {
        match self {
            Self::Requested { attempt } => Self::Succeeded { attempts: attempt },
            other => other,
        }
    }

    /// The in-flight request failed; retry or give up
    pub fn fail(self, cause: TransportError, policy: &RetryPolicy) -> Self {
        match self {
            Self::Requested { attempt } if attempt <= policy.max_retries => Self::RetryScheduled {
                attempt,
                delay: policy.delay(attempt, cause.retry_after()),
                cause,
            },
            Self::Requested { attempt } => Self::Fallback {
                attempts: attempt,
                reason: format!(
                    "model request failed after {} attempt{}: {}",
                    attempt,
                    if attempt == 1 { "" } else { "s" },
                    cause
                ),
            },
            other => other,
        }
    }

    /// Stop the batch; terminal states are kept
    pub fn cancel(self, why: &str) -> Self {
        match self {
            Self::Pending => Self::Fallback {
                attempts: 0,
                reason: format!("cancelled: {}", why),
            },
            Self::Requested { attempt } | Self::RetryScheduled { attempt, .. } => Self::Fallback {
                attempts: attempt,
                reason: format!("cancelled: {}", why),
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Fallback { .. })
    }

    /// Requests issued so far
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Requested { attempt } | Self::RetryScheduled { attempt, .. } => *attempt,
            Self::Succeeded { attempts } | Self::Fallback { attempts, .. } => *attempts,
        }
    }
}
