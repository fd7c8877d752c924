use std::{sync::Arc, time::Duration};

use crate::{
    context::ClientIdentity,
    store::{KeyValueStore, StoreError},
};

pub const KEY_PREFIX: &str = "rate-limit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub retry_after_secs: u64,
    /// True when the store could not be consulted and the request was let through.
    pub degraded: bool,
}

impl RateLimitDecision {
    fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining: 0,
            retry_after_secs: 0,
            degraded: true,
        }
    }
}

/// Fixed-window counter over the shared store.
///
/// The first increment in a window sets the key's expiry; later increments
/// never touch it, so a window always ends `window` after its first request.
/// Concurrent first requests may both set the expiry, which at worst stretches
/// that window slightly.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit: limit.max(1),
            window: window.max(Duration::from_millis(1)),
        }
    }

    pub fn key(identity: &ClientIdentity) -> String {
        format!("{KEY_PREFIX}:{}", identity.as_str())
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_millis().div_ceil(1_000).max(1) as u64
    }

    pub async fn check(&self, identity: &ClientIdentity) -> RateLimitDecision {
        let key = Self::key(identity);

        let count = match self.store.increment(&key).await {
            Ok(count) => count.max(0) as u64,
            Err(err) => {
                log_degraded(&err, &key, "rate limiter store unavailable; admitting request");
                return RateLimitDecision::fail_open();
            }
        };

        if count == 1
            && let Err(err) = self.store.expire(&key, self.window).await
        {
            log_degraded(&err, &key, "failed to start rate limit window; admitting request");
            return RateLimitDecision::fail_open();
        }

        if count > self.limit {
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: self.retry_after_secs(),
                degraded: false,
            }
        } else {
            RateLimitDecision {
                allowed: true,
                remaining: self.limit - count,
                retry_after_secs: 0,
                degraded: false,
            }
        }
    }
}

fn log_degraded(err: &StoreError, key: &str, message: &str) {
    if err.is_disabled() {
        tracing::debug!(key = %key, "{message}");
    } else {
        tracing::warn!(key = %key, error = %err, "{message}");
    }
}
