//! Route table: the ordered snapshot the dispatcher scans.
//!
//! # Responsibilities
//! - Pull compiled routes from a `RouteLocator`
//! - Sort by order (stable, so ties keep source order)
//! - Publish the result as one immutable, versioned snapshot
//!
//! # Design Decisions
//! - Readers load an `Arc<RouteSnapshot>`; a refresh swaps the whole
//!   snapshot and never touches the one readers hold
//! - Concurrent refreshes race on the swap; the last one wins
//! - A failed pull leaves the current snapshot in place

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::GatewayError;
use crate::routing::route::Route;

/// Anything that can produce compiled routes.
#[async_trait]
pub trait RouteLocator: Send + Sync {
    async fn get_routes(&self) -> Result<Vec<Arc<Route>>, GatewayError>;
}

/// Concatenates its delegates' routes in delegate order.
pub struct CompositeRouteLocator {
    delegates: Vec<Arc<dyn RouteLocator>>,
}

impl CompositeRouteLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteLocator>>) -> Self {
        Self { delegates }
    }
}

#[async_trait]
impl RouteLocator for CompositeRouteLocator {
    async fn get_routes(&self) -> Result<Vec<Arc<Route>>, GatewayError> {
        let mut all = Vec::new();
        for delegate in &self.delegates {
            all.extend(delegate.get_routes().await?);
        }
        Ok(all)
    }
}

/// One generation of the route table.
#[derive(Debug)]
pub struct RouteSnapshot {
    generation: u64,
    routes: Vec<Arc<Route>>,
}

impl RouteSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Routes in dispatch order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }
}

pub struct RouteTable {
    locator: Arc<dyn RouteLocator>,
    snapshot: ArcSwap<RouteSnapshot>,
    generations: AtomicU64,
}

impl RouteTable {
    /// Builds the first snapshot before returning.
    pub async fn new(locator: Arc<dyn RouteLocator>) -> Result<Self, GatewayError> {
        let routes = Self::load(locator.as_ref()).await?;
        tracing::info!(routes = routes.len(), generation = 1, "Route table built");
        Ok(Self {
            locator,
            snapshot: ArcSwap::from_pointee(RouteSnapshot {
                generation: 1,
                routes,
            }),
            generations: AtomicU64::new(1),
        })
    }

    async fn load(locator: &dyn RouteLocator) -> Result<Vec<Arc<Route>>, GatewayError> {
        let mut routes = locator.get_routes().await?;
        routes.sort_by_key(|r| r.order());
        Ok(routes)
    }

    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.load_full()
    }

    /// Re-pull and swap in a new snapshot. Returns the one it replaced.
    pub async fn refresh(&self) -> Result<Arc<RouteSnapshot>, GatewayError> {
        let routes = Self::load(self.locator.as_ref()).await?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let count = routes.len();
        let previous = self
            .snapshot
            .swap(Arc::new(RouteSnapshot { generation, routes }));
        tracing::debug!(
            generation = generation,
            previous_generation = previous.generation,
            routes = count,
            "Route table swapped"
        );
        Ok(previous)
    }
}
