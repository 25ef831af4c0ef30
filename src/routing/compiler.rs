//! Route compiler: `RouteDefinition` → executable `Route`.
//!
//! # Data Flow
//! ```text
//! RouteDefinition { id, uri, order, predicates, filters }
//!     → uri parsed (scheme may be logical, e.g. lb://)
//!     → predicates resolved → AndPredicate
//!     → default_filters (orders 1..D) + route filters (orders 1..R)
//!     → stable sort by order (defaults first on ties)
//!     → Route
//! ```
//!
//! # Design Decisions
//! - A definition without predicates is rejected, never compiled into a
//!   match-all route
//! - One bad definition fails the whole pull; the table keeps its
//!   previous snapshot

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterRegistry, OrderedFilter};
use crate::routing::args::{ExpressionResolver, TableExpressionResolver};
use crate::routing::definition::{FilterDefinition, RouteDefinition};
use crate::routing::predicate::{AndPredicate, PredicateRegistry, RoutePredicate};
use crate::routing::route::Route;
use crate::routing::source::RouteDefinitionLocator;
use crate::routing::table::RouteLocator;

/// Compiles definitions against the predicate and filter registries.
///
/// Clones share the filter registry, so a registry swapped in after a
/// config reload is used by every clone from the next compile on.
#[derive(Debug, Clone)]
pub struct RouteCompiler {
    predicates: Arc<PredicateRegistry>,
    filters: Arc<ArcSwap<FilterRegistry>>,
}

impl RouteCompiler {
    pub fn new(predicates: Arc<PredicateRegistry>, filters: Arc<FilterRegistry>) -> Self {
        Self {
            predicates,
            filters: Arc::new(ArcSwap::new(filters)),
        }
    }

    /// Replace the filter registry used for subsequent compiles.
    pub fn set_filters(&self, filters: Arc<FilterRegistry>) {
        self.filters.store(filters);
    }

    pub fn compile(
        &self,
        definition: &RouteDefinition,
        default_filters: &[FilterDefinition],
        resolver: &dyn ExpressionResolver,
    ) -> Result<Route, CompileError> {
        let uri = destination(definition)?;

        if definition.predicates.is_empty() {
            return Err(CompileError::NoPredicates(definition.id.clone()));
        }
        let predicates = definition
            .predicates
            .iter()
            .map(|p| self.predicates.resolve(&definition.id, p, resolver))
            .collect::<Result<Vec<Arc<dyn RoutePredicate>>, _>>()?;

        let registry = self.filters.load();
        let mut filters = registry.resolve(&definition.id, default_filters, resolver)?;
        filters.extend(registry.resolve(&definition.id, &definition.filters, resolver)?);
        filters.sort_by_key(OrderedFilter::order);

        tracing::debug!(
            route_id = %definition.id,
            uri = %uri,
            order = definition.order,
            filters = filters.len(),
            "Compiled route"
        );

        Ok(Route::new(
            definition.id.clone(),
            uri,
            definition.order,
            Arc::new(AndPredicate::new(predicates)),
            filters,
        ))
    }
}

fn destination(definition: &RouteDefinition) -> Result<Url, CompileError> {
    let invalid = |reason: String| CompileError::InvalidDestination {
        route_id: definition.id.clone(),
        uri: definition.uri.clone(),
        reason,
    };
    let uri = Url::parse(&definition.uri).map_err(|e| invalid(e.to_string()))?;
    if !uri.has_host() {
        return Err(invalid("destination has no host".to_string()));
    }
    Ok(uri)
}

/// Routes compiled from a definition source.
///
/// Default filters and expression values come from the configuration
/// current at pull time.
pub struct RouteDefinitionRouteLocator {
    definitions: Arc<dyn RouteDefinitionLocator>,
    compiler: RouteCompiler,
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl RouteDefinitionRouteLocator {
    pub fn new(
        definitions: Arc<dyn RouteDefinitionLocator>,
        compiler: RouteCompiler,
        config: Arc<ArcSwap<GatewayConfig>>,
    ) -> Self {
        Self {
            definitions,
            compiler,
            config,
        }
    }
}

#[async_trait]
impl RouteLocator for RouteDefinitionRouteLocator {
    async fn get_routes(&self) -> Result<Vec<Arc<Route>>, GatewayError> {
        let definitions = self.definitions.get_route_definitions().await?;
        let config = self.config.load();
        let resolver = TableExpressionResolver::new(config.expressions.clone());

        definitions
            .iter()
            .map(|definition| {
                self.compiler
                    .compile(definition, &config.default_filters, &resolver)
                    .map(Arc::new)
                    .map_err(|e| {
                        tracing::error!(route_id = %definition.id, error = %e, "Route compilation failed");
                        GatewayError::from(e)
                    })
            })
            .collect()
    }
}
