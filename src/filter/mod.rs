//! Filter subsystem: exchange model, filter contract, chain engine.
//!
//! # Data Flow
//! ```text
//! matched Route (default + route filters, orders 1..N)
//!     + global filters (write-response -1, route-to-url 10000,
//!       load balancer 10100, http/websocket routing MAX)
//!     → FilteringHandler::combine (stable sort by order)
//!     → FilterChain (index + slice, one hop per `chain.filter(..)`)
//!
//!   pre:   f1 → f2 → ... → routing filter (backend call)
//!   post:  f1 ← f2 ← ... ← (response stored on the exchange)
//! ```
//!
//! # Design Decisions
//! - One filter trait for global and per-route filters; the order lives in
//!   `OrderedFilter`, not in the filter
//! - A filter short-circuits by completing without calling the chain
//! - Running off the end of the chain completes with no content

pub mod chain;
pub mod exchange;
pub mod factory;
pub mod global;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;

pub use chain::{FilterChain, FilteringHandler};
pub use exchange::{ExchangeAttributes, GatewayRequest, GatewayResponse, RequestBuilder, ServerExchange};
pub use factory::{FilterDependencies, FilterRegistry, GatewayFilterFactory};

/// Order given to global filters that do not declare one.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// A unit of work in the filter chain.
///
/// Pre-phase work happens before `chain.filter(exchange).await`, post-phase
/// work after it. Not calling the chain short-circuits everything after.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Declared order, for global filters. `None` sorts last.
    fn order(&self) -> Option<i32> {
        None
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError>;
}

/// A filter with the order it sorts by.
#[derive(Clone)]
pub struct OrderedFilter {
    filter: Arc<dyn GatewayFilter>,
    order: i32,
}

impl OrderedFilter {
    pub fn new(filter: Arc<dyn GatewayFilter>, order: i32) -> Self {
        Self { filter, order }
    }

    /// Wrap a global filter using its declared order.
    pub fn global(filter: Arc<dyn GatewayFilter>) -> Self {
        let order = filter.order().unwrap_or(LOWEST_PRECEDENCE);
        Self { filter, order }
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn filter(&self) -> &Arc<dyn GatewayFilter> {
        &self.filter
    }
}

impl fmt::Debug for OrderedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedFilter")
            .field("name", &self.filter.name())
            .field("order", &self.order)
            .finish()
    }
}
