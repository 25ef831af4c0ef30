//! Route predicates and their factories.
//!
//! # Data Flow
//! ```text
//! PredicateDefinition { name: "Path", args }
//!     → PredicateRegistry::resolve (lookup factory by name)
//!     → bind_args (hints, expressions, validation)
//!     → factory.apply → Arc<dyn RoutePredicate>
//!
//! Route predicates [p1, p2, p3]
//!     → AndPredicate (left to right, stops at the first false)
//! ```
//!
//! # Design Decisions
//! - Factories are registered once at startup; the registry is read-only
//!   afterwards and shared behind an `Arc`
//! - Predicates only read the request; the one exception is Path, which
//!   records captured template variables on the exchange when it matches
//! - Patterns and regexes are compiled in `apply`, never per request

pub mod datetime;
pub mod host;
pub mod path;
pub mod remote_addr;
pub mod request;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CompileError;
use crate::filter::exchange::ServerExchange;
use crate::routing::args::{bind_args, ArgumentHints, BoundArgs, ExpressionResolver};
use crate::routing::definition::PredicateDefinition;

pub use datetime::{AfterPredicateFactory, BeforePredicateFactory, BetweenPredicateFactory};
pub use host::HostPredicateFactory;
pub use path::{PathPattern, PathPredicateFactory};
pub use remote_addr::RemoteAddrPredicateFactory;
pub use request::{CookiePredicateFactory, MethodPredicateFactory, QueryPredicateFactory};

/// Argument key shared by the pattern-based predicates.
pub const PATTERN_KEY: &str = "pattern";

/// Boolean test over a request.
pub trait RoutePredicate: Send + Sync {
    fn test(&self, exchange: &mut ServerExchange) -> bool;
}

impl<F> RoutePredicate for F
where
    F: Fn(&mut ServerExchange) -> bool + Send + Sync,
{
    fn test(&self, exchange: &mut ServerExchange) -> bool {
        self(exchange)
    }
}

/// Conjunction of predicates, evaluated in declaration order.
pub struct AndPredicate {
    predicates: Vec<Arc<dyn RoutePredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Arc<dyn RoutePredicate>>) -> Self {
        Self { predicates }
    }
}

impl RoutePredicate for AndPredicate {
    fn test(&self, exchange: &mut ServerExchange) -> bool {
        self.predicates.iter().all(|p| p.test(exchange))
    }
}

/// Builds a predicate from bound arguments.
pub trait RoutePredicateFactory: ArgumentHints + Send + Sync {
    /// Name used in definitions, e.g. `Path`.
    fn name(&self) -> &'static str;

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn RoutePredicate>, CompileError>;
}

/// Name → factory mapping for predicates.
#[derive(Default)]
pub struct PredicateRegistry {
    factories: HashMap<String, Arc<dyn RoutePredicateFactory>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in predicate kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AfterPredicateFactory));
        registry.register(Arc::new(BeforePredicateFactory));
        registry.register(Arc::new(BetweenPredicateFactory));
        registry.register(Arc::new(CookiePredicateFactory));
        registry.register(Arc::new(HostPredicateFactory));
        registry.register(Arc::new(MethodPredicateFactory));
        registry.register(Arc::new(PathPredicateFactory));
        registry.register(Arc::new(QueryPredicateFactory));
        registry.register(Arc::new(RemoteAddrPredicateFactory));
        registry
    }

    /// Register a factory. A later registration under the same name wins.
    pub fn register(&mut self, factory: Arc<dyn RoutePredicateFactory>) {
        let name = factory.name();
        if self.factories.contains_key(name) {
            tracing::warn!(
                factory = name,
                "A RoutePredicateFactory with this name already exists, it will be overwritten"
            );
        }
        tracing::debug!(factory = name, "Loaded RoutePredicateFactory");
        self.factories.insert(name.to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RoutePredicateFactory>> {
        self.factories.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Compile one predicate definition.
    pub fn resolve(
        &self,
        route_id: &str,
        definition: &PredicateDefinition,
        resolver: &dyn ExpressionResolver,
    ) -> Result<Arc<dyn RoutePredicate>, CompileError> {
        let factory = self
            .get(&definition.name)
            .ok_or_else(|| CompileError::UnknownPredicateType(definition.name.clone()))?;

        tracing::debug!(
            route_id = route_id,
            predicate = %definition.name,
            args = %definition.args,
            "Applying predicate"
        );

        let args = bind_args(factory.name(), factory.as_ref(), &definition.args, resolver)?;
        factory.apply(&args)
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::filter::exchange::GatewayRequest;
    use crate::routing::args::TableExpressionResolver;
    use crate::routing::definition::Args;
    use axum::http::{HeaderMap, Method};
    use std::sync::Mutex;

    pub(crate) fn exchange(method: Method, uri: &str) -> ServerExchange {
        ServerExchange::new(GatewayRequest::new(method, uri.parse().unwrap(), HeaderMap::new()))
    }

    struct Spy {
        id: usize,
        result: bool,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl RoutePredicate for Spy {
        fn test(&self, _exchange: &mut ServerExchange) -> bool {
            self.calls.lock().unwrap().push(self.id);
            self.result
        }
    }

    fn spies(results: &[bool], calls: &Arc<Mutex<Vec<usize>>>) -> AndPredicate {
        AndPredicate::new(
            results
                .iter()
                .enumerate()
                .map(|(id, &result)| {
                    Arc::new(Spy {
                        id,
                        result,
                        calls: calls.clone(),
                    }) as Arc<dyn RoutePredicate>
                })
                .collect(),
        )
    }

    #[test]
    fn test_and_is_true_only_when_all_true() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut ex = exchange(Method::GET, "/");

        assert!(spies(&[true, true, true], &calls).test(&mut ex));
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_and_short_circuits_in_declaration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut ex = exchange(Method::GET, "/");

        assert!(!spies(&[true, false, true], &calls).test(&mut ex));
        assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_unknown_predicate_rejected() {
        let registry = PredicateRegistry::with_defaults();
        let def = PredicateDefinition::new("Nope", Args::new());
        let err = registry
            .resolve("r1", &def, &TableExpressionResolver::default())
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::UnknownPredicateType(ref n) if n == "Nope"));
    }

    #[test]
    fn test_closure_is_a_predicate() {
        let p: Arc<dyn RoutePredicate> =
            Arc::new(|ex: &mut ServerExchange| ex.request().path() == "/ok");
        assert!(p.test(&mut exchange(Method::GET, "/ok")));
        assert!(!p.test(&mut exchange(Method::GET, "/no")));
    }
}
