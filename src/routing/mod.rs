//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route definitions (config, admin repository)
//!     → source.rs (composite, cached snapshot)
//!     → compiler.rs (predicates + filters resolved by name)
//!     → table.rs (sorted by order, swapped atomically on refresh)
//!
//! Incoming request
//!     → dispatcher.rs (scan table, first predicate match wins)
//!     → Matched(route) bound to the exchange, or NoRoute
//! ```
//!
//! # Design Decisions
//! - Factories are looked up by name once, at compile time
//! - Compiled routes are immutable; a refresh replaces the whole table
//! - Deterministic: same request and table always pick the same route
//! - A definition that fails to compile fails the refresh, it never
//!   degrades into a match-all route

pub mod args;
pub mod builder;
pub mod compiler;
pub mod definition;
pub mod dispatcher;
pub mod predicate;
pub mod refresh;
pub mod route;
pub mod source;
pub mod table;

pub use builder::{RouteSpec, Routes, RoutesBuilder, StaticRouteLocator};
pub use compiler::{RouteCompiler, RouteDefinitionRouteLocator};
pub use definition::{Args, FilterDefinition, PredicateDefinition, RouteDefinition};
pub use dispatcher::{Dispatch, Dispatcher};
pub use predicate::{PredicateRegistry, RoutePredicate, RoutePredicateFactory};
pub use refresh::{RefreshSender, RefreshTrigger, RouteRefresher};
pub use route::Route;
pub use source::{
    CachingRouteDefinitionLocator, CompositeRouteDefinitionLocator,
    InMemoryRouteDefinitionRepository, PropertiesRouteDefinitionLocator, RouteDefinitionLocator,
};
pub use table::{CompositeRouteLocator, RouteLocator, RouteSnapshot, RouteTable};
