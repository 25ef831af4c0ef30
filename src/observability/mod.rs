//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! server / filters / rate limiter / refresher
//!     → logging.rs (EnvFilter + fmt or JSON subscriber)
//!     → metrics.rs (request, rate-limit and refresh counters)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Log lines on the request path carry `request_id` and `route_id`
//! - `RUST_LOG` overrides the configured level

pub mod logging;
pub mod metrics;
