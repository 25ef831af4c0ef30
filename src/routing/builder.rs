//! Code-defined routes.
//!
//! ```ignore
//! let locator = Routes::locator()
//!     .route("health", |r| r.path("/health").filter(Arc::new(SetStatus)).uri("http://localhost:9000"))
//!     .build()?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{CompileError, GatewayError};
use crate::filter::{GatewayFilter, OrderedFilter};
use crate::routing::args::BoundArgs;
use crate::routing::predicate::{
    AndPredicate, HostPredicateFactory, PathPredicateFactory, RoutePredicate, RoutePredicateFactory,
    PATTERN_KEY,
};
use crate::routing::route::Route;
use crate::routing::table::RouteLocator;

pub struct Routes;

impl Routes {
    pub fn locator() -> RoutesBuilder {
        RoutesBuilder::default()
    }
}

#[derive(Default)]
pub struct RoutesBuilder {
    specs: Vec<Result<Route, CompileError>>,
}

impl RoutesBuilder {
    pub fn route(mut self, id: &str, build: impl FnOnce(RouteSpec) -> RouteSpec) -> Self {
        self.specs.push(build(RouteSpec::new(id)).finish());
        self
    }

    /// Fails on the first route that did not build.
    pub fn build(self) -> Result<StaticRouteLocator, CompileError> {
        let routes = self
            .specs
            .into_iter()
            .map(|r| r.map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StaticRouteLocator { routes })
    }
}

/// One route under construction. Errors are kept until `build`.
pub struct RouteSpec {
    id: String,
    order: i32,
    uri: Option<String>,
    predicates: Vec<Arc<dyn RoutePredicate>>,
    filters: Vec<OrderedFilter>,
    error: Option<CompileError>,
}

impl RouteSpec {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            order: 0,
            uri: None,
            predicates: Vec::new(),
            filters: Vec::new(),
            error: None,
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_string());
        self
    }

    pub fn predicate(mut self, predicate: Arc<dyn RoutePredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn path(self, pattern: &str) -> Self {
        self.from_factory(&PathPredicateFactory, pattern)
    }

    pub fn host(self, pattern: &str) -> Self {
        self.from_factory(&HostPredicateFactory, pattern)
    }

    fn from_factory(mut self, factory: &dyn RoutePredicateFactory, pattern: &str) -> Self {
        match factory.apply(&BoundArgs::from([(PATTERN_KEY, pattern)])) {
            Ok(predicate) => self.predicates.push(predicate),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Add a filter ordered after the ones already added.
    pub fn filter(self, filter: Arc<dyn GatewayFilter>) -> Self {
        let order = self.filters.len() as i32 + 1;
        self.filter_with_order(filter, order)
    }

    pub fn filter_with_order(mut self, filter: Arc<dyn GatewayFilter>, order: i32) -> Self {
        self.filters.push(OrderedFilter::new(filter, order));
        self
    }

    fn finish(mut self) -> Result<Route, CompileError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let raw = self.uri.unwrap_or_default();
        let uri = Url::parse(&raw).map_err(|e| CompileError::InvalidDestination {
            route_id: self.id.clone(),
            uri: raw.clone(),
            reason: e.to_string(),
        })?;
        if self.predicates.is_empty() {
            return Err(CompileError::NoPredicates(self.id));
        }
        self.filters.sort_by_key(OrderedFilter::order);
        Ok(Route::new(
            self.id,
            uri,
            self.order,
            Arc::new(AndPredicate::new(self.predicates)),
            self.filters,
        ))
    }
}

/// Fixed set of routes built in code.
#[derive(Debug, Clone)]
pub struct StaticRouteLocator {
    routes: Vec<Arc<Route>>,
}

#[async_trait]
impl RouteLocator for StaticRouteLocator {
    async fn get_routes(&self) -> Result<Vec<Arc<Route>>, GatewayError> {
        Ok(self.routes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::chain::tests::{Log, Recording};
    use crate::routing::predicate::tests::exchange;
    use crate::filter::{GatewayRequest, ServerExchange};
    use axum::http::{HeaderMap, HeaderValue, Method};

    #[tokio::test]
    async fn test_builder_produces_routes() {
        let log: Log = Arc::default();
        let locator = Routes::locator()
            .route("api", |r| {
                r.order(-1)
                    .path("/api/**")
                    .filter(Arc::new(Recording::new("second", None, &log)))
                    .filter_with_order(Arc::new(Recording::new("first", None, &log)), 0)
                    .uri("http://localhost:3000")
            })
            .route("docs", |r| r.host("**.example.org").uri("lb://docs"))
            .build()
            .unwrap();

        let routes = locator.get_routes().await.unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].order(), -1);
        let names: Vec<&str> = routes[0].filters().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["first", "second"]);

        assert!(routes[0].matches(&mut exchange(Method::GET, "/api/v1")));
        let mut ex = exchange(Method::GET, "/");
        assert!(!routes[0].matches(&mut ex));

        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("www.example.org"));
        let mut docs = ServerExchange::new(GatewayRequest::new(Method::GET, "/".parse().unwrap(), headers));
        assert!(routes[1].matches(&mut docs));
    }

    #[test]
    fn test_builder_reports_bad_routes() {
        assert!(matches!(
            Routes::locator().route("no-pred", |r| r.uri("http://localhost")).build(),
            Err(CompileError::NoPredicates(_))
        ));
        assert!(matches!(
            Routes::locator().route("no-uri", |r| r.path("/**")).build(),
            Err(CompileError::InvalidDestination { .. })
        ));
    }
}
