//! Route filter factories.
//!
//! # Data Flow
//! ```text
//! [FilterDefinition]  (default_filters, then the route's own list)
//!     → FilterRegistry::resolve (lookup, bind_args, factory.apply)
//!     → OrderedFilter { order: position + 1 }
//! ```
//!
//! # Design Decisions
//! - Header names, regexes, statuses and URLs are validated in `apply`;
//!   a bad argument fails route compilation instead of the request
//! - Factories that need shared services (rate limiter, breakers) get them
//!   through `FilterDependencies` at registry construction

pub mod headers;
pub mod hystrix;
pub mod path;
pub mod rate_limit;
pub mod status;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};

use crate::error::CompileError;
use crate::filter::{GatewayFilter, OrderedFilter};
use crate::rate_limit::{KeyResolvers, RateLimiter};
use crate::resilience::CircuitBreakerRegistry;
use crate::routing::args::{bind_args, ArgumentHints, BoundArgs, ExpressionResolver};
use crate::routing::definition::FilterDefinition;

pub use headers::{
    AddRequestHeaderFilterFactory, AddResponseHeaderFilterFactory,
    RemoveNonProxyHeadersFilterFactory, RemoveRequestHeaderFilterFactory,
    RemoveResponseHeaderFilterFactory, SetResponseHeaderFilterFactory,
    DEFAULT_NON_PROXY_HEADERS,
};
pub use hystrix::HystrixFilterFactory;
pub use path::{
    AddRequestParameterFilterFactory, PrefixPathFilterFactory, RewritePathFilterFactory,
    SetPathFilterFactory,
};
pub use rate_limit::RequestRateLimiterFilterFactory;
pub use status::{RedirectToFilterFactory, SetStatusFilterFactory};

pub const NAME_KEY: &str = "name";
pub const VALUE_KEY: &str = "value";

/// Builds a filter from bound arguments.
pub trait GatewayFilterFactory: ArgumentHints + Send + Sync {
    /// Name used in definitions, e.g. `AddRequestHeader`.
    fn name(&self) -> &'static str;

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError>;
}

/// Shared services filter factories are built with.
#[derive(Clone)]
pub struct FilterDependencies {
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub key_resolvers: Arc<KeyResolvers>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry>,
    /// Headers removed by `RemoveNonProxyHeaders`.
    pub non_proxy_headers: Vec<String>,
}

/// Name → factory mapping for filters.
#[derive(Default)]
pub struct FilterRegistry {
    factories: HashMap<String, Arc<dyn GatewayFilterFactory>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the full built-in catalogue.
    pub fn with_defaults(deps: FilterDependencies) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AddRequestHeaderFilterFactory));
        registry.register(Arc::new(AddRequestParameterFilterFactory));
        registry.register(Arc::new(AddResponseHeaderFilterFactory));
        registry.register(Arc::new(HystrixFilterFactory::new(deps.circuit_breakers)));
        registry.register(Arc::new(PrefixPathFilterFactory));
        registry.register(Arc::new(RedirectToFilterFactory));
        registry.register(Arc::new(RemoveNonProxyHeadersFilterFactory::new(
            deps.non_proxy_headers,
        )));
        registry.register(Arc::new(RemoveRequestHeaderFilterFactory));
        registry.register(Arc::new(RemoveResponseHeaderFilterFactory));
        registry.register(Arc::new(RequestRateLimiterFilterFactory::new(
            deps.rate_limiter,
            deps.key_resolvers,
        )));
        registry.register(Arc::new(RewritePathFilterFactory));
        registry.register(Arc::new(SetPathFilterFactory));
        registry.register(Arc::new(SetResponseHeaderFilterFactory));
        registry.register(Arc::new(SetStatusFilterFactory));
        registry
    }

    /// Register a factory. A later registration under the same name wins.
    pub fn register(&mut self, factory: Arc<dyn GatewayFilterFactory>) {
        let name = factory.name();
        if self.factories.contains_key(name) {
            tracing::warn!(
                factory = name,
                "A GatewayFilterFactory with this name already exists, it will be overwritten"
            );
        }
        tracing::debug!(factory = name, "Loaded GatewayFilterFactory");
        self.factories.insert(name.to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn GatewayFilterFactory>> {
        self.factories.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Compile a filter list. Each filter is ordered by its position (1-based).
    pub fn resolve(
        &self,
        owner: &str,
        definitions: &[FilterDefinition],
        resolver: &dyn ExpressionResolver,
    ) -> Result<Vec<OrderedFilter>, CompileError> {
        definitions
            .iter()
            .enumerate()
            .map(|(idx, definition)| {
                let factory = self
                    .get(&definition.name)
                    .ok_or_else(|| CompileError::UnknownFilterType(definition.name.clone()))?;

                tracing::debug!(
                    route_id = owner,
                    filter = %definition.name,
                    args = %definition.args,
                    "Applying filter"
                );

                let args = bind_args(factory.name(), factory.as_ref(), &definition.args, resolver)?;
                let filter = factory.apply(&args)?;
                Ok(OrderedFilter::new(filter, idx as i32 + 1))
            })
            .collect()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

pub(crate) fn header_name(factory: &str, raw: &str) -> Result<HeaderName, CompileError> {
    HeaderName::from_bytes(raw.as_bytes())
        .map_err(|e| CompileError::filter(factory, format!("invalid header name '{}': {}", raw, e)))
}

pub(crate) fn header_value(factory: &str, raw: &str) -> Result<HeaderValue, CompileError> {
    HeaderValue::from_str(raw)
        .map_err(|e| CompileError::filter(factory, format!("invalid header value '{}': {}", raw, e)))
}
