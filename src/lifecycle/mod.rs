//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → registries → definition sources → route table → Gateway
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → background tasks stop, server drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → route refresh
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Listeners start last, so traffic only arrives once routes are compiled

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{shutdown_signal, spawn_refresh_on_sighup};
pub use startup::{Gateway, GatewayBuilder};
