//! API gateway library.
//!
//! Routes are compiled from definitions into predicate + filter pipelines,
//! matched per request, and run through an ordered filter chain that ends in
//! the backend call. `RequestRateLimiter` admits requests through a token
//! bucket evaluated atomically in a script store.

pub mod admin;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod rate_limit;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::{CompileError, GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
