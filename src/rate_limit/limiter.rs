//! Token-bucket admission control over a script store.

use std::sync::Arc;

use async_trait::async_trait;

use super::clock::Clock;
use super::script::{self, REQUEST_RATE_LIMITER_SCRIPT};
use super::store::{ScriptStore, StoreError};
use crate::observability::metrics;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResponse {
    pub allowed: bool,
    /// Tokens left in the bucket, or `-1` when the store could not be asked.
    pub tokens_remaining: i64,
}

impl RateLimitResponse {
    /// Reply used when the store fails: let the request through.
    pub const FAIL_OPEN: Self = Self {
        allowed: true,
        tokens_remaining: -1,
    };
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take one token from the bucket named `id`.
    async fn is_allowed(&self, id: &str, replenish_rate: u32, burst_capacity: u32) -> RateLimitResponse;
}

/// Runs the `request_rate_limiter` script with the caller's clock.
pub struct TokenBucketRateLimiter {
    store: Arc<dyn ScriptStore>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketRateLimiter {
    pub fn new(store: Arc<dyn ScriptStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn check(
        &self,
        id: &str,
        replenish_rate: u32,
        burst_capacity: u32,
    ) -> Result<RateLimitResponse, StoreError> {
        let keys = script::keys(id);
        let args = script::args(replenish_rate, burst_capacity, self.clock.now_secs());
        let reply = self
            .store
            .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys, &args)
            .await?;

        match reply.as_slice() {
            [allowed, tokens, ..] => Ok(RateLimitResponse {
                allowed: *allowed == 1,
                tokens_remaining: *tokens,
            }),
            other => Err(StoreError::Unavailable(format!(
                "unexpected script reply {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn is_allowed(&self, id: &str, replenish_rate: u32, burst_capacity: u32) -> RateLimitResponse {
        match self.check(id, replenish_rate, burst_capacity).await {
            Ok(response) => {
                tracing::trace!(
                    key = %id,
                    allowed = response.allowed,
                    tokens_remaining = response.tokens_remaining,
                    "Rate limit checked"
                );
                response
            }
            Err(e) => {
                tracing::error!(key = %id, error = %e, "Error determining if user allowed from store, failing open");
                metrics::record_rate_limiter_fail_open();
                RateLimitResponse::FAIL_OPEN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;
    use crate::rate_limit::store::InMemoryScriptStore;
    use crate::rate_limit::tests::FailingStore;

    fn limiter() -> (TokenBucketRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let limiter = TokenBucketRateLimiter::new(Arc::new(InMemoryScriptStore::new()), clock.clone());
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_burst_then_one_per_second() {
        let (limiter, clock) = limiter();

        for remaining in (0..5).rev() {
            let response = limiter.is_allowed("user", 1, 5).await;
            assert!(response.allowed);
            assert_eq!(response.tokens_remaining, remaining);
        }
        assert!(!limiter.is_allowed("user", 1, 5).await.allowed);

        clock.advance(1);
        assert!(limiter.is_allowed("user", 1, 5).await.allowed);
        assert!(!limiter.is_allowed("user", 1, 5).await.allowed);
    }

    #[tokio::test]
    async fn test_buckets_keyed_by_id() {
        let (limiter, _) = limiter();
        assert!(limiter.is_allowed("a", 1, 1).await.allowed);
        assert!(!limiter.is_allowed("a", 1, 1).await.allowed);
        assert!(limiter.is_allowed("b", 1, 1).await.allowed);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = TokenBucketRateLimiter::new(Arc::new(FailingStore), Arc::new(ManualClock::new(0)));
        let response = limiter.is_allowed("user", 1, 1).await;
        assert_eq!(response, RateLimitResponse { allowed: true, tokens_remaining: -1 });
    }
}
