//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! request URL lb://users/...
//!     → pool.rs (backends of group "users")
//!     → strategy:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest in-flight requests)
//!     → backend.rs (connection guard held for the backend call)
//!     → http://{addr}/...
//! ```
//!
//! # Design Decisions
//! - Strategy selection from config, one selector per group
//! - Backends at max_connections are skipped
//! - The pool is rebuilt and swapped when configuration reloads

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use backend::Backend;

pub use backend::BackendConnectionGuard;
pub use pool::BackendManager;

/// Picks one backend out of a group.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
