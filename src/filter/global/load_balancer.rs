//! Resolves `lb://group` request URLs to a concrete backend.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::GatewayError;
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::load_balancer::BackendManager;

pub const LOAD_BALANCER_CLIENT_FILTER_ORDER: i32 = 10100;

pub struct LoadBalancerClientFilter {
    backends: Arc<ArcSwap<BackendManager>>,
}

impl LoadBalancerClientFilter {
    pub fn new(backends: Arc<ArcSwap<BackendManager>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl GatewayFilter for LoadBalancerClientFilter {
    fn name(&self) -> &str {
        "LoadBalancerClient"
    }

    fn order(&self) -> Option<i32> {
        Some(LOAD_BALANCER_CLIENT_FILTER_ORDER)
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let url = match &exchange.attributes().request_url {
            Some(url) if url.scheme() == "lb" => url.clone(),
            _ => return chain.filter(exchange).await,
        };

        exchange.attributes_mut().add_original_request_url(url.clone());
        let group = url.host_str().unwrap_or_default();
        let guard = self
            .backends
            .load()
            .get(group)
            .ok_or_else(|| GatewayError::NotFound(url.to_string()))?;

        let mut resolved = guard.base_url.clone();
        resolved.set_path(url.path());
        resolved.set_query(url.query());
        tracing::trace!(group, backend = %guard.name, url = %resolved, "LoadBalancerClientFilter url chosen");

        let attributes = exchange.attributes_mut();
        attributes.request_url = Some(resolved);
        attributes.backend = Some(guard);
        chain.filter(exchange).await
    }
}
