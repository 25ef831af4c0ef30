//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend instance of an `lb://` group
//! - Track active connections (for Least Connections LB)
//! - Enforce max connection limits

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

/// A single backend instance.
#[derive(Debug)]
pub struct Backend {
    /// Name from configuration, used in logs.
    pub name: String,
    pub addr: SocketAddr,
    /// `http://{addr}`, computed once.
    pub base_url: Url,
    /// Maximum concurrent forwarded requests.
    pub max_connections: usize,
    /// Forwarded requests currently in flight.
    pub active_connections: AtomicUsize,
}

impl Backend {
    pub fn new(name: impl Into<String>, addr: SocketAddr, max_connections: usize) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&format!("http://{}", addr))?;
        Ok(Self {
            name: name.into(),
            addr,
            base_url,
            max_connections,
            active_connections: AtomicUsize::new(0),
        })
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Whether the backend can take another request.
    pub fn has_capacity(&self) -> bool {
        self.active() < self.max_connections
    }

    /// Reserve a connection slot. `None` when the backend is full.
    pub fn try_create_guard(self: &Arc<Self>) -> Option<BackendConnectionGuard> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(BackendConnectionGuard {
            backend: self.clone(),
        })
    }
}

/// Holds a connection slot until dropped.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
