//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize every subsystem from a validated configuration
//! - Assemble the definition sources, route table and filter chain
//! - Apply hot-reloaded configuration: backends, filter dependencies and
//!   the principal header right away, routes on the refresh that follows
//!
//! # Design Decisions
//! - Fail fast: the initial route table must compile, or startup fails
//! - Subsystems initialize in dependency order, not concurrently
//! - Factory registries are built once here and never change afterwards

use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use axum::http::HeaderName;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::filter::global::default_global_filters;
use crate::filter::{FilterDependencies, FilterRegistry, FilteringHandler};
use crate::load_balancer::BackendManager;
use crate::rate_limit::{
    Clock, InMemoryScriptStore, KeyResolvers, RateLimiter, ScriptStore, SystemClock,
    TokenBucketRateLimiter,
};
use crate::resilience::CircuitBreakerRegistry;
use crate::routing::{
    CachingRouteDefinitionLocator, CompositeRouteDefinitionLocator, CompositeRouteLocator,
    Dispatcher, InMemoryRouteDefinitionRepository, PredicateRegistry,
    PropertiesRouteDefinitionLocator, RouteCompiler, RouteDefinitionRouteLocator, RouteLocator,
    RouteRefresher, RouteTable, StaticRouteLocator,
};

/// Every long-lived gateway component, wired together.
#[derive(Clone)]
pub struct Gateway {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub backends: Arc<ArcSwap<BackendManager>>,
    pub repository: Arc<InMemoryRouteDefinitionRepository>,
    pub definitions: Arc<CachingRouteDefinitionLocator>,
    pub table: Arc<RouteTable>,
    pub refresher: Arc<RouteRefresher>,
    pub dispatcher: Dispatcher,
    pub handler: Arc<FilteringHandler>,
    pub compiler: RouteCompiler,
    pub filter_deps: Arc<ArcSwap<FilterDependencies>>,
    /// Request header the principal name is read from, if configured.
    pub principal_header: Arc<ArcSwapOption<HeaderName>>,
    pub store: Arc<InMemoryScriptStore>,
    pub clock: Arc<dyn Clock>,
}

/// Filter dependencies for `config`. The rate limiter always carries over so
/// buckets survive reloads; breakers carry over unless their settings changed.
fn filter_dependencies(
    config: &GatewayConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    previous: Option<(&GatewayConfig, &FilterDependencies)>,
) -> FilterDependencies {
    let circuit_breakers = match previous {
        Some((old, deps)) if old.circuit_breaker == config.circuit_breaker => {
            deps.circuit_breakers.clone()
        }
        _ => Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone())),
    };
    FilterDependencies {
        rate_limiter,
        key_resolvers: Arc::new(KeyResolvers::with_defaults(
            &config.rate_limiter.default_key_resolver,
        )),
        circuit_breakers,
        non_proxy_headers: config.filters.remove_non_proxy_headers.headers.clone(),
    }
}

fn principal_header(config: &GatewayConfig) -> Option<Arc<HeaderName>> {
    let name = config.rate_limiter.principal_header.as_deref()?;
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(header) => Some(Arc::new(header)),
        Err(e) => {
            tracing::warn!(header = name, error = %e, "Ignoring invalid principal header");
            None
        }
    }
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    routes: Option<StaticRouteLocator>,
}

impl GatewayBuilder {
    /// Time source for the rate limiter.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Routes defined in code, served next to the configured ones.
    pub fn routes(mut self, routes: StaticRouteLocator) -> Self {
        self.routes = Some(routes);
        self
    }

    pub async fn build(self) -> Result<Gateway, GatewayError> {
        let GatewayBuilder {
            config,
            clock,
            routes,
        } = self;

        let backends = Arc::new(ArcSwap::from_pointee(BackendManager::new(
            &config.backends,
            config.load_balancer.strategy,
        )));

        let store = Arc::new(InMemoryScriptStore::new());
        let rate_limiter: Arc<dyn RateLimiter> = Arc::new(TokenBucketRateLimiter::new(
            store.clone() as Arc<dyn ScriptStore>,
            clock.clone(),
        ));
        let deps = filter_dependencies(&config, rate_limiter, None);
        let compiler = RouteCompiler::new(
            Arc::new(PredicateRegistry::with_defaults()),
            Arc::new(FilterRegistry::with_defaults(deps.clone())),
        );
        let filter_deps = Arc::new(ArcSwap::from_pointee(deps));
        let principal_header = Arc::new(ArcSwapOption::new(principal_header(&config)));
        let handler = Arc::new(FilteringHandler::new(default_global_filters(
            &config.timeouts,
            backends.clone(),
        )));

        let config = Arc::new(ArcSwap::from_pointee(config));
        let repository = Arc::new(InMemoryRouteDefinitionRepository::new());
        let definitions = Arc::new(
            CachingRouteDefinitionLocator::new(Arc::new(CompositeRouteDefinitionLocator::new(vec![
                Arc::new(PropertiesRouteDefinitionLocator::new(config.clone())),
                repository.clone(),
            ])))
            .await?,
        );

        let mut locators: Vec<Arc<dyn RouteLocator>> = vec![Arc::new(
            RouteDefinitionRouteLocator::new(definitions.clone(), compiler.clone(), config.clone()),
        )];
        if let Some(routes) = routes {
            locators.push(Arc::new(routes));
        }
        let table = Arc::new(RouteTable::new(Arc::new(CompositeRouteLocator::new(locators))).await?);
        let refresher = Arc::new(RouteRefresher::new(definitions.clone(), table.clone()));

        Ok(Gateway {
            config,
            backends,
            repository,
            definitions,
            dispatcher: Dispatcher::new(table.clone()),
            table,
            refresher,
            handler,
            compiler,
            filter_deps,
            principal_header,
            store,
            clock,
        })
    }
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            clock: Arc::new(SystemClock),
            routes: None,
        }
    }

    /// Swap in a reloaded configuration. Backend groups, filter
    /// dependencies and the principal header change right away; routes are
    /// recompiled with them on the next refresh.
    pub fn apply_config(&self, config: GatewayConfig) {
        self.backends.store(Arc::new(BackendManager::new(
            &config.backends,
            config.load_balancer.strategy,
        )));

        let current = self.config.load_full();
        let previous = self.filter_deps.load_full();
        let deps = filter_dependencies(
            &config,
            previous.rate_limiter.clone(),
            Some((&*current, &*previous)),
        );
        self.compiler
            .set_filters(Arc::new(FilterRegistry::with_defaults(deps.clone())));
        self.filter_deps.store(Arc::new(deps));
        self.principal_header.store(principal_header(&config));

        self.config.store(Arc::new(config));
    }

    /// Start the rate limiter bucket sweeper.
    pub fn spawn_housekeeping(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.load().rate_limiter.housekeeping_secs.max(1));
        self.store
            .clone()
            .spawn_housekeeping(self.clock.clone(), interval, shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::routing::{RefreshTrigger, RouteDefinition, Routes};

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.routes.push(
            RouteDefinition::new("users", "lb://users")
                .order(1)
                .predicate("Path=/users/**"),
        );
        config.backends.push(BackendConfig {
            name: "users-1".into(),
            group: "users".into(),
            address: "127.0.0.1:3001".into(),
            max_connections: 10,
        });
        config
    }

    #[tokio::test]
    async fn test_build_compiles_configured_and_code_routes() {
        let code = Routes::locator()
            .route("code", |r| r.path("/code/**").uri("http://localhost:9000"))
            .build()
            .unwrap();
        let gateway = Gateway::builder(config()).routes(code).build().await.unwrap();

        let snapshot = gateway.table.snapshot();
        let ids: Vec<&str> = snapshot.routes().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["code", "users"]);
        assert!(gateway.backends.load().get("users").is_some());
    }

    #[tokio::test]
    async fn test_broken_initial_route_fails_startup() {
        let mut config = config();
        config.routes.push(RouteDefinition::new("broken", "http://localhost").predicate("Nope=1"));
        assert!(Gateway::builder(config).build().await.is_err());
    }

    #[tokio::test]
    async fn test_apply_config_then_refresh() {
        let gateway = Gateway::builder(config()).build().await.unwrap();

        let mut next = config();
        next.routes[0] = RouteDefinition::new("orders", "lb://orders").predicate("Path=/orders/**");
        next.backends[0].group = "orders".into();
        gateway.apply_config(next);

        assert!(gateway.backends.load().get("orders").is_some());
        gateway.refresher.refresh(RefreshTrigger::ConfigReload).await.unwrap();
        assert_eq!(gateway.table.snapshot().routes()[0].id(), "orders");
    }

    #[tokio::test]
    async fn test_apply_config_rebuilds_filter_dependencies() {
        let gateway = Gateway::builder(config()).build().await.unwrap();
        let breakers = gateway.filter_deps.load().circuit_breakers.clone();
        assert!(gateway.principal_header.load().is_none());

        let mut next = config();
        next.filters.remove_non_proxy_headers.headers = vec!["X-Secret".into()];
        next.rate_limiter.principal_header = Some("x-user".into());
        gateway.apply_config(next.clone());

        let deps = gateway.filter_deps.load();
        assert_eq!(deps.non_proxy_headers, vec!["X-Secret".to_string()]);
        assert!(Arc::ptr_eq(&deps.circuit_breakers, &breakers));
        assert_eq!(gateway.principal_header.load().as_deref().map(|h| h.as_str()), Some("x-user"));

        next.circuit_breaker.failure_threshold = 9;
        gateway.apply_config(next);
        assert!(!Arc::ptr_eq(&gateway.filter_deps.load().circuit_breakers, &breakers));
    }

    #[tokio::test]
    async fn test_saved_definitions_appear_after_refresh() {
        let gateway = Gateway::builder(config()).build().await.unwrap();
        gateway
            .repository
            .save(RouteDefinition::new("saved", "http://localhost:3002").predicate("Path=/saved"))
            .await;
        assert_eq!(gateway.table.snapshot().routes().len(), 1);

        gateway.refresher.refresh(RefreshTrigger::Admin).await.unwrap();
        assert_eq!(gateway.table.snapshot().routes().len(), 2);
    }
}
