//! Filter chain engine.
//!
//! # Responsibilities
//! - Merge global filters with the matched route's filters
//! - Sort by order (stable, so ties keep declaration order)
//! - Run the sorted list as an index-addressed continuation chain

use std::sync::Arc;

use super::{GatewayFilter, OrderedFilter, ServerExchange};
use crate::error::GatewayError;
use crate::routing::Route;

/// Remainder of a filter chain.
///
/// `filter` runs the filter at the cursor and hands it a chain positioned
/// one further. Past the end it completes immediately.
#[derive(Clone, Copy)]
pub struct FilterChain<'a> {
    filters: &'a [OrderedFilter],
    index: usize,
}

impl<'a> FilterChain<'a> {
    pub fn new(filters: &'a [OrderedFilter]) -> Self {
        Self { filters, index: 0 }
    }

    pub async fn filter(self, exchange: &mut ServerExchange) -> Result<(), GatewayError> {
        match self.filters.get(self.index) {
            Some(current) => {
                let next = FilterChain {
                    filters: self.filters,
                    index: self.index + 1,
                };
                tracing::trace!(
                    filter = current.name(),
                    order = current.order(),
                    "Invoking filter"
                );
                current.filter().filter(exchange, next).await
            }
            None => Ok(()),
        }
    }
}

/// Runs matched exchanges through global and route filters.
pub struct FilteringHandler {
    global_filters: Vec<OrderedFilter>,
}

impl FilteringHandler {
    pub fn new(global_filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        Self {
            global_filters: global_filters.into_iter().map(OrderedFilter::global).collect(),
        }
    }

    pub fn global_filters(&self) -> &[OrderedFilter] {
        &self.global_filters
    }

    /// Global filters followed by the route's filters, stably sorted by order.
    pub fn combine(&self, route: &Route) -> Vec<OrderedFilter> {
        let mut combined: Vec<OrderedFilter> = self
            .global_filters
            .iter()
            .chain(route.filters())
            .cloned()
            .collect();
        combined.sort_by_key(OrderedFilter::order);
        combined
    }

    /// Run the chain for an exchange that has a bound route.
    pub async fn handle(&self, exchange: &mut ServerExchange) -> Result<(), GatewayError> {
        let route = exchange
            .route()
            .cloned()
            .ok_or_else(|| GatewayError::Internal("no route bound to exchange".to_string()))?;

        let filters = self.combine(&route);
        tracing::debug!(
            route_id = route.id(),
            filters = ?filters,
            "Sorted filter chain"
        );

        FilterChain::new(&filters).filter(exchange).await
    }
}
