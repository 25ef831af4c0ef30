//! Compiled route.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::filter::exchange::ServerExchange;
use crate::filter::OrderedFilter;
use crate::routing::predicate::RoutePredicate;

/// Immutable unit binding a predicate to a destination and a filter list.
///
/// Filters are already sorted (defaults first on ties); their orders are
/// only used when merging with the global filters.
#[derive(Clone)]
pub struct Route {
    id: String,
    uri: Url,
    order: i32,
    predicate: Arc<dyn RoutePredicate>,
    filters: Vec<OrderedFilter>,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        uri: Url,
        order: i32,
        predicate: Arc<dyn RoutePredicate>,
        filters: Vec<OrderedFilter>,
    ) -> Self {
        Self {
            id: id.into(),
            uri,
            order,
            predicate,
            filters,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn filters(&self) -> &[OrderedFilter] {
        &self.filters
    }

    pub fn matches(&self, exchange: &mut ServerExchange) -> bool {
        self.predicate.test(exchange)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("uri", &self.uri.as_str())
            .field("order", &self.order)
            .field("filters", &self.filters)
            .finish()
    }
}
