//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend call:
//!     → timeouts.rs (connect/request deadline → GatewayError::Timeout)
//!
//! Hystrix filter:
//!     → circuit_breaker.rs (fail fast when open)
//!     → timeouts.rs (command deadline around the rest of the chain)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Circuit breakers are named and shared; routes opt in per filter

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, State as CircuitState};
pub use timeouts::with_timeout;
