//! Route definition sources.
//!
//! # Data Flow
//! ```text
//! PropertiesRouteDefinitionLocator (config `routes`)  ┐
//! InMemoryRouteDefinitionRepository (admin API)       ┴→ Composite (source order kept)
//!     → CachingRouteDefinitionLocator (snapshot, refresh on signal)
//!     → route compiler
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::routing::definition::RouteDefinition;

/// Anything that can list route definitions.
#[async_trait]
pub trait RouteDefinitionLocator: Send + Sync {
    async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError>;
}

/// Routes declared in the gateway configuration.
///
/// Reads the current configuration on every pull, so a hot-reloaded file
/// shows up on the next refresh.
pub struct PropertiesRouteDefinitionLocator {
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl PropertiesRouteDefinitionLocator {
    pub fn new(config: Arc<ArcSwap<GatewayConfig>>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RouteDefinitionLocator for PropertiesRouteDefinitionLocator {
    async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError> {
        Ok(self.config.load().routes.clone())
    }
}

/// Mutable definitions saved at runtime. Saving an existing id replaces it
/// in place.
#[derive(Debug, Default)]
pub struct InMemoryRouteDefinitionRepository {
    routes: RwLock<Vec<RouteDefinition>>,
}

impl InMemoryRouteDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, definition: RouteDefinition) {
        let mut routes = self.routes.write().await;
        match routes.iter_mut().find(|r| r.id == definition.id) {
            Some(existing) => *existing = definition,
            None => routes.push(definition),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<RouteDefinition, GatewayError> {
        let mut routes = self.routes.write().await;
        let idx = routes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("RouteDefinition not found: {}", id)))?;
        Ok(routes.remove(idx))
    }
}

#[async_trait]
impl RouteDefinitionLocator for InMemoryRouteDefinitionRepository {
    async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError> {
        Ok(self.routes.read().await.clone())
    }
}

/// Concatenates its delegates' definitions in delegate order.
pub struct CompositeRouteDefinitionLocator {
    delegates: Vec<Arc<dyn RouteDefinitionLocator>>,
}

impl CompositeRouteDefinitionLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteDefinitionLocator>>) -> Self {
        Self { delegates }
    }
}

#[async_trait]
impl RouteDefinitionLocator for CompositeRouteDefinitionLocator {
    async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError> {
        let mut all = Vec::new();
        for delegate in &self.delegates {
            all.extend(delegate.get_route_definitions().await?);
        }
        Ok(all)
    }
}

/// Serves the last pulled snapshot of a delegate until refreshed.
pub struct CachingRouteDefinitionLocator {
    delegate: Arc<dyn RouteDefinitionLocator>,
    cache: ArcSwap<Vec<RouteDefinition>>,
}

impl CachingRouteDefinitionLocator {
    /// Pulls the delegate once before returning.
    pub async fn new(delegate: Arc<dyn RouteDefinitionLocator>) -> Result<Self, GatewayError> {
        let initial = delegate.get_route_definitions().await?;
        Ok(Self {
            delegate,
            cache: ArcSwap::from_pointee(initial),
        })
    }

    pub fn snapshot(&self) -> Arc<Vec<RouteDefinition>> {
        self.cache.load_full()
    }

    /// Re-pull the delegate and swap the snapshot in. Returns the previous one.
    /// On failure the current snapshot stays.
    pub async fn refresh(&self) -> Result<Arc<Vec<RouteDefinition>>, GatewayError> {
        let fresh = self.delegate.get_route_definitions().await?;
        Ok(self.cache.swap(Arc::new(fresh)))
    }

    /// Put back a snapshot returned by [`refresh`](Self::refresh).
    pub fn restore(&self, snapshot: Arc<Vec<RouteDefinition>>) {
        self.cache.store(snapshot);
    }
}

#[async_trait]
impl RouteDefinitionLocator for CachingRouteDefinitionLocator {
    async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError> {
        Ok(self.cache.load().as_ref().clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Source whose definitions tests can swap out.
    #[derive(Default)]
    pub(crate) struct MutableSource {
        pub routes: std::sync::Mutex<Vec<RouteDefinition>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl MutableSource {
        pub(crate) fn set(&self, routes: Vec<RouteDefinition>) {
            *self.routes.lock().unwrap() = routes;
        }
    }

    #[async_trait]
    impl RouteDefinitionLocator for MutableSource {
        async fn get_route_definitions(&self) -> Result<Vec<RouteDefinition>, GatewayError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(GatewayError::Source("backing store offline".into()));
            }
            Ok(self.routes.lock().unwrap().clone())
        }
    }

    fn ids(routes: &[RouteDefinition]) -> Vec<&str> {
        routes.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_repository_save_replaces_and_delete_removes() {
        let repo = InMemoryRouteDefinitionRepository::new();
        repo.save(RouteDefinition::new("a", "http://a")).await;
        repo.save(RouteDefinition::new("b", "http://b")).await;
        repo.save(RouteDefinition::new("a", "http://a2")).await;

        let routes = repo.get_route_definitions().await.unwrap();
        assert_eq!(ids(&routes), vec!["a", "b"]);
        assert_eq!(routes[0].uri, "http://a2");

        repo.delete("a").await.unwrap();
        assert!(matches!(repo.delete("a").await, Err(GatewayError::NotFound(_))));
        assert_eq!(ids(&repo.get_route_definitions().await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn test_composite_preserves_source_order() {
        let first = Arc::new(InMemoryRouteDefinitionRepository::new());
        first.save(RouteDefinition::new("z", "http://z")).await;
        first.save(RouteDefinition::new("y", "http://y")).await;
        let second = Arc::new(InMemoryRouteDefinitionRepository::new());
        second.save(RouteDefinition::new("a", "http://a")).await;

        let composite = CompositeRouteDefinitionLocator::new(vec![first, second]);
        let routes = composite.get_route_definitions().await.unwrap();
        assert_eq!(ids(&routes), vec!["z", "y", "a"]);
    }

    #[tokio::test]
    async fn test_properties_source_follows_config_swaps() {
        let config = Arc::new(ArcSwap::from_pointee(GatewayConfig::default()));
        let source = PropertiesRouteDefinitionLocator::new(config.clone());
        assert!(source.get_route_definitions().await.unwrap().is_empty());

        let mut next = GatewayConfig::default();
        next.routes.push(RouteDefinition::new("cfg", "http://cfg"));
        config.store(Arc::new(next));
        assert_eq!(ids(&source.get_route_definitions().await.unwrap()), vec!["cfg"]);
    }

    #[tokio::test]
    async fn test_cache_serves_snapshot_until_refreshed() {
        let source = Arc::new(MutableSource::default());
        source.set(vec![RouteDefinition::new("old", "http://old")]);
        let cache = CachingRouteDefinitionLocator::new(source.clone()).await.unwrap();

        source.set(vec![RouteDefinition::new("new", "http://new")]);
        assert_eq!(ids(&cache.get_route_definitions().await.unwrap()), vec!["old"]);

        let previous = cache.refresh().await.unwrap();
        assert_eq!(ids(&previous), vec!["old"]);
        assert_eq!(ids(&cache.get_route_definitions().await.unwrap()), vec!["new"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let source = Arc::new(MutableSource::default());
        source.set(vec![RouteDefinition::new("old", "http://old")]);
        let cache = CachingRouteDefinitionLocator::new(source.clone()).await.unwrap();

        source.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(cache.refresh().await.is_err());
        assert_eq!(ids(&cache.snapshot()), vec!["old"]);
    }
}
