//! Commits the response once every other filter has unwound.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};

pub const WRITE_RESPONSE_FILTER_ORDER: i32 = -1;

/// First in, last out: its post phase runs after every other filter's, so
/// route filters can still edit the backend response before it is committed.
pub struct WriteResponseFilter;

#[async_trait]
impl GatewayFilter for WriteResponseFilter {
    fn name(&self) -> &str {
        "WriteResponse"
    }

    fn order(&self) -> Option<i32> {
        Some(WRITE_RESPONSE_FILTER_ORDER)
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        chain.filter(exchange).await?;
        let response = exchange.response_mut();
        if !response.is_committed() {
            response.set_complete();
        }
        Ok(())
    }
}
