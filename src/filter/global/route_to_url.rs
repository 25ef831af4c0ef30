//! Points the request at the matched route's destination.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};

pub const ROUTE_TO_URL_FILTER_ORDER: i32 = 10000;

/// Request URL = destination scheme and authority + the (possibly rewritten)
/// request path and query. Any path on the destination itself is ignored.
pub struct RouteToRequestUrlFilter;

#[async_trait]
impl GatewayFilter for RouteToRequestUrlFilter {
    fn name(&self) -> &str {
        "RouteToRequestUrl"
    }

    fn order(&self) -> Option<i32> {
        Some(ROUTE_TO_URL_FILTER_ORDER)
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let Some(route) = exchange.route().cloned() else {
            return chain.filter(exchange).await;
        };

        let mut url = route.uri().clone();
        url.set_path(exchange.request().path());
        url.set_query(exchange.request().query());

        tracing::trace!(route_id = route.id(), url = %url, "RouteToRequestUrlFilter resolved");
        exchange.attributes_mut().request_url = Some(url);
        chain.filter(exchange).await
    }
}
