//! Distributed token-bucket rate limiting.
//!
//! # Data Flow
//! ```text
//! RequestRateLimiter filter
//!     → KeyResolver (remote address, principal, ...)   → bucket id
//!     → TokenBucketRateLimiter::is_allowed(id, rate, burst)
//!         → ScriptStore::execute("request_rate_limiter", keys, [rate, burst, now, 1])
//!     ← RateLimitResponse { allowed, tokens_remaining }
//! ```
//!
//! # Design Decisions
//! - Bucket state lives in the store and is only touched through the atomic
//!   script, so several gateway instances can share one store
//! - `now` comes from the calling instance's clock, not the store's
//! - Store failures fail open: `(allowed, -1)`, logged and counted

pub mod clock;
pub mod key_resolver;
pub mod limiter;
pub mod script;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key_resolver::{
    KeyResolver, KeyResolvers, PrincipalNameKeyResolver, RemoteAddrKeyResolver,
    PRINCIPAL_NAME_KEY_RESOLVER, REMOTE_ADDR_KEY_RESOLVER,
};
pub use limiter::{RateLimitResponse, RateLimiter, TokenBucketRateLimiter};
pub use store::{InMemoryScriptStore, ScriptStore, StoreError};

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    /// A store that is always down.
    pub(crate) struct FailingStore;

    #[async_trait]
    impl ScriptStore for FailingStore {
        async fn execute(
            &self,
            _script: &str,
            _keys: &[String],
            _args: &[String],
        ) -> Result<Vec<i64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }
}
