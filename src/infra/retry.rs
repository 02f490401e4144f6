//! Retry with exponential backoff and jitter
//!
//! Used only by the DID resolver; everything else in the pipeline fails
//! fast. Errors are classified as retryable or non-retryable by tagging:
//! callers that cross the network wrap their errors in [`RetryError`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::error::{GatewayError, Result};

/// An error tagged with its retry classification.
///
/// Deadline-exceeded is always retryable; untagged errors default to
/// retryable as well (transient network faults are the common case on the
/// resolver path).
#[derive(Debug)]
pub enum RetryError {
    Retryable(GatewayError),
    NonRetryable(GatewayError),
}

impl RetryError {
    pub fn into_inner(self) -> GatewayError {
        match self {
            RetryError::Retryable(e) | RetryError::NonRetryable(e) => e,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryError::Retryable(_))
    }
}

/// Default classification for gateway errors crossing the retry boundary
pub fn classify(err: GatewayError) -> RetryError {
    match err {
        GatewayError::Timeout => RetryError::Retryable(err),
        GatewayError::InvalidDidFormat(_)
        | GatewayError::UnsupportedDidMethod(_)
        | GatewayError::InvalidRequest(_) => RetryError::NonRetryable(err),
        _ => RetryError::Retryable(err),
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on exponential growth
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Apply ±25% jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Profile for HTTPS document fetches (did:web)
    pub fn web_resolver() -> Self {
        Self::default()
    }

    /// Profile for the slower blockchain-backed resolver (did:ion)
    pub fn ion_resolver() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (1-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = exp.min(self.max_delay.as_secs_f64());

        let delayed = if self.jitter {
            let factor = 1.0 + rand::thread_rng().gen_range(-0.25..=0.25);
            (capped * factor).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delayed)
    }
}

/// Run `operation` with exponential backoff.
///
/// Stops immediately on a `NonRetryable` error; otherwise retries up to
/// `max_attempts` and surfaces the last error.
pub async fn with_backoff<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let mut last_err: Option<GatewayError> = None;

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            let delay = config.delay_for_attempt(attempt - 1);
            tracing::debug!(
                attempt,
                max_attempts = config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::NonRetryable(e)) => return Err(e),
            Err(RetryError::Retryable(e)) => {
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| GatewayError::Internal("max retry attempts reached".to_string())))
}

// ============================================================================
// Tests
// ============================================================================
