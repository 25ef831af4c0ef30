//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID assigned / propagated)
//!     → ServerExchange built from the request head + body (+ ws upgrade)
//!     → Dispatcher (route match) → FilteringHandler (filter chain)
//!     → response from the exchange, or 404 when nothing matched
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
