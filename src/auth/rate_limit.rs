//! Per-DID rate limiting
//!
//! Fixed-window counters in the shared KV, keyed by `(policy, did)`. The
//! atomic `incr` sets the window TTL when it creates the counter; within
//! a window the accepted count can exceed the limit only by the number of
//! concurrent in-flight increments.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::Policy;
use crate::infra::cache::keys;
use crate::infra::{GatewayError, KvStore, Result};

pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Count one request from `did` against `policy`.
    ///
    /// Policies without a rate limit always pass.
    pub async fn check(&self, did: &str, policy: &Policy) -> Result<()> {
        let Some(rule) = &policy.rate_limit else {
            return Ok(());
        };

        let key = format!("{}{}:{}", keys::RATE, policy.id, did);
        let count = self
            .kv
            .incr(&key, Duration::from_secs(rule.window_seconds))
            .await?;

        if count > rule.max_requests as i64 {
            tracing::warn!(
                did,
                policy = %policy.id,
                count,
                max = rule.max_requests,
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimited);
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
