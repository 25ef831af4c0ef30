//! Script store contract and the in-process store.
//!
//! # Design Decisions
//! - A store runs a named script against a set of keys atomically; the
//!   limiter never locks anything itself
//! - `InMemoryScriptStore` keeps both bucket keys in one map entry, so the
//!   shard lock held by `DashMap::entry` makes each evaluation atomic per id
//! - Expiry is honoured lazily on access and swept by a housekeeping task

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;

use super::clock::Clock;
use super::script::{self, Bucket, ScriptArgs, REQUEST_RATE_LIMITER_SCRIPT};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown script '{0}'")]
    UnknownScript(String),

    #[error("invalid script arguments: {0}")]
    InvalidArguments(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Executes scripts atomically against shared state.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn execute(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    bucket: Bucket,
    expires_at: i64,
}

/// Buckets held in a sharded map inside this process.
#[derive(Debug, Default)]
pub struct InMemoryScriptStore {
    buckets: DashMap<String, Entry>,
}

impl InMemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired but unswept) buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket whose expiry is at or before `now_secs`.
    pub fn purge_expired(&self, now_secs: i64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, entry| entry.expires_at > now_secs);
        before.saturating_sub(self.buckets.len())
    }

    /// Sweep expired buckets every `interval` until shutdown.
    pub fn spawn_housekeeping(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = self.purge_expired(clock.now_secs());
                        if purged > 0 {
                            tracing::debug!(purged, remaining = self.len(), "Purged expired rate limiter buckets");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    fn run_token_bucket(&self, keys: &[String], args: &[String]) -> Result<Vec<i64>, StoreError> {
        let [tokens_key, _timestamp_key] = keys else {
            return Err(StoreError::InvalidArguments(format!(
                "expected 2 keys, got {}",
                keys.len()
            )));
        };
        let args = ScriptArgs::parse(args)?;

        let mut slot = self.buckets.entry(tokens_key.clone()).or_insert(Entry {
            bucket: Bucket {
                tokens: args.capacity,
                timestamp: args.now,
            },
            expires_at: i64::MIN,
        });

        let previous = (slot.expires_at > args.now).then_some(slot.bucket);
        let evaluation = script::evaluate(previous, &args);
        *slot = Entry {
            bucket: evaluation.bucket,
            expires_at: args.now + args.ttl_secs(),
        };

        Ok(evaluation.reply())
    }
}

#[async_trait]
impl ScriptStore for InMemoryScriptStore {
    async fn execute(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Vec<i64>, StoreError> {
        match script {
            REQUEST_RATE_LIMITER_SCRIPT => self.run_token_bucket(keys, args),
            other => Err(StoreError::UnknownScript(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::script::{args, keys};

    #[tokio::test]
    async fn test_buckets_are_independent_per_id() {
        let store = InMemoryScriptStore::new();
        let a = store
            .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("a"), &args(1, 1, 10))
            .await
            .unwrap();
        let a_again = store
            .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("a"), &args(1, 1, 10))
            .await
            .unwrap();
        let b = store
            .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("b"), &args(1, 1, 10))
            .await
            .unwrap();

        assert_eq!(a, vec![1, 0]);
        assert_eq!(a_again, vec![0, 0]);
        assert_eq!(b, vec![1, 0]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_bucket_starts_full_again() {
        let store = InMemoryScriptStore::new();
        for _ in 0..2 {
            store
                .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("k"), &args(1, 2, 0))
                .await
                .unwrap();
        }
        // ttl = 2 * ceil(2 / 1) = 4s
        assert_eq!(store.purge_expired(3), 0);
        assert_eq!(store.purge_expired(4), 1);
        assert!(store.is_empty());

        let reply = store
            .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("k"), &args(1, 2, 5))
            .await
            .unwrap();
        assert_eq!(reply, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_unknown_script_and_bad_keys() {
        let store = InMemoryScriptStore::new();
        assert!(matches!(
            store.execute("nope", &keys("k"), &args(1, 1, 0)).await,
            Err(StoreError::UnknownScript(_))
        ));
        assert!(matches!(
            store
                .execute(REQUEST_RATE_LIMITER_SCRIPT, &["only-one".to_string()], &args(1, 1, 0))
                .await,
            Err(StoreError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_overspend() {
        let store = Arc::new(InMemoryScriptStore::new());
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .execute(REQUEST_RATE_LIMITER_SCRIPT, &keys("hot"), &args(1, 10, 0))
                    .await
                    .unwrap()[0]
            }));
        }

        let mut allowed = 0;
        for task in tasks {
            allowed += task.await.unwrap();
        }
        assert_eq!(allowed, 10);
    }
}
