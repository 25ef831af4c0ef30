//! Circuit breaker guarding routes wrapped in the `Hystrix` filter.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: after open_secs
//! Half-Open → Closed: success_threshold trial calls succeed
//! Half-Open → Open: a trial call fails
//! ```
//!
//! Half-Open admits one trial call at a time. A trial that never reports back
//! (its request was cancelled) stops blocking others after the command
//! timeout.
//!
//! # Design Decisions
//! - One breaker per command name, shared by every route naming it
//! - Fail fast in Open state (no waiting for timeout)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: RwLock<State>,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    trial_started: Mutex<Option<Instant>>,
    failure_threshold: u64,
    success_threshold: u64,
    open_for: Duration,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::Closed),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            trial_started: Mutex::new(None),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_for: Duration::from_secs(config.open_secs),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deadline for one guarded call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a call may proceed. Moves Open to Half-Open once the open
    /// period has elapsed; in Half-Open only the caller holding the trial
    /// slot may proceed.
    pub async fn allow_request(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            State::Closed => true,
            State::HalfOpen => self.claim_trial().await,
            State::Open => {
                let elapsed = self
                    .opened_at
                    .read()
                    .await
                    .map(|at| at.elapsed() >= self.open_for)
                    .unwrap_or(true);
                if !elapsed {
                    return false;
                }
                let mut state = self.state.write().await;
                match *state {
                    State::Closed => return true,
                    State::Open => {
                        *state = State::HalfOpen;
                        self.success_count.store(0, Ordering::Relaxed);
                        tracing::info!(breaker = %self.name, "Circuit breaker half-open, admitting a trial call");
                    }
                    State::HalfOpen => {}
                }
                drop(state);
                self.claim_trial().await
            }
        }
    }

    async fn claim_trial(&self) -> bool {
        let mut trial = self.trial_started.lock().await;
        match *trial {
            Some(started) if started.elapsed() < self.timeout => false,
            _ => {
                *trial = Some(Instant::now());
                true
            }
        }
    }

    async fn release_trial(&self) {
        *self.trial_started.lock().await = None;
    }

    pub async fn record_success(&self) {
        let state = *self.state.read().await;
        match state {
            State::HalfOpen => {
                self.release_trial().await;
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.success_threshold {
                    *self.state.write().await = State::Closed;
                    self.failure_count.store(0, Ordering::Relaxed);
                    self.success_count.store(0, Ordering::Relaxed);
                    tracing::info!(breaker = %self.name, "Circuit breaker closed");
                }
            }
            State::Closed => self.failure_count.store(0, Ordering::Relaxed),
            State::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let state = *self.state.read().await;
        match state {
            State::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.failure_threshold {
                    self.trip(failures).await;
                }
            }
            State::HalfOpen => {
                self.success_count.store(0, Ordering::Relaxed);
                self.trip(0).await;
                self.release_trial().await;
            }
            State::Open => *self.opened_at.write().await = Some(Instant::now()),
        }
    }

    async fn trip(&self, failures: u64) {
        *self.state.write().await = State::Open;
        *self.opened_at.write().await = Some(Instant::now());
        self.failure_count.store(0, Ordering::Relaxed);
        tracing::warn!(
            breaker = %self.name,
            failures,
            open_secs = self.open_for.as_secs(),
            "Circuit breaker opened"
        );
        metrics::record_circuit_open(&self.name);
    }

    pub async fn state(&self) -> State {
        *self.state.read().await
    }
}

/// Breakers by command name, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, &self.config)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(open_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            timeout_ms: 100,
            failure_threshold: 2,
            open_secs,
            success_threshold: 1,
        }
    }

    async fn opened(config: &CircuitBreakerConfig) -> CircuitBreaker {
        let cb = CircuitBreaker::new("users", config);
        cb.record_failure().await;
        cb.record_failure().await;
        cb
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("users", &config(60));
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, State::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, State::Open);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_or_reopens() {
        let cb = CircuitBreaker::new("users", &config(0));
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, State::Open);

        assert!(cb.allow_request().await);
        assert_eq!(cb.state().await, State::HalfOpen);
        cb.record_failure().await;
        assert_eq!(cb.state().await, State::Open);

        assert!(cb.allow_request().await);
        cb.record_success().await;
        assert_eq!(cb.state().await, State::Closed);
    }

    #[test]
    fn test_registry_shares_breakers_by_name() {
        let registry = CircuitBreakerRegistry::new(config(5));
        let a = registry.get("a");
        assert!(Arc::ptr_eq(&a, &registry.get("a")));
        assert!(!Arc::ptr_eq(&a, &registry.get("b")));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.timeout(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_half_open_admits_one_trial_at_a_time() {
        let cb = opened(&CircuitBreakerConfig {
            success_threshold: 2,
            ..config(0)
        })
        .await;

        assert!(cb.allow_request().await);
        assert_eq!(cb.state().await, State::HalfOpen);
        assert!(!cb.allow_request().await);
        assert!(!cb.allow_request().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, State::HalfOpen);
        assert!(cb.allow_request().await);
        assert!(!cb.allow_request().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, State::Closed);
        assert!(cb.allow_request().await);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_abandoned_trial_frees_the_slot_after_timeout() {
        let cb = opened(&CircuitBreakerConfig {
            timeout_ms: 20,
            ..config(0)
        })
        .await;

        assert!(cb.allow_request().await);
        assert!(!cb.allow_request().await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.allow_request().await);
    }
}
