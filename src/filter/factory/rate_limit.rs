//! RequestRateLimiter: admit a request only if its bucket has a token.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::GatewayFilterFactory;
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::observability::metrics;
use crate::rate_limit::{KeyResolver, KeyResolvers, RateLimiter};
use crate::routing::args::{ArgumentHints, BoundArgs};

pub const REPLENISH_RATE_KEY: &str = "replenishRate";
pub const BURST_CAPACITY_KEY: &str = "burstCapacity";
pub const KEY_RESOLVER_KEY: &str = "keyResolver";

pub struct RequestRateLimiterFilterFactory {
    limiter: Arc<dyn RateLimiter>,
    resolvers: Arc<KeyResolvers>,
}

impl RequestRateLimiterFilterFactory {
    pub fn new(limiter: Arc<dyn RateLimiter>, resolvers: Arc<KeyResolvers>) -> Self {
        Self { limiter, resolvers }
    }
}

impl ArgumentHints for RequestRateLimiterFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[REPLENISH_RATE_KEY, BURST_CAPACITY_KEY, KEY_RESOLVER_KEY]
    }

    fn validate_args(&self) -> bool {
        false
    }
}

struct RequestRateLimiter {
    limiter: Arc<dyn RateLimiter>,
    resolver: Arc<dyn KeyResolver>,
    replenish_rate: u32,
    burst_capacity: u32,
}

#[async_trait]
impl GatewayFilter for RequestRateLimiter {
    fn name(&self) -> &str {
        "RequestRateLimiter"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let key = self.resolver.resolve(exchange).await?;
        let response = self
            .limiter
            .is_allowed(&key, self.replenish_rate, self.burst_capacity)
            .await;

        if response.allowed {
            return chain.filter(exchange).await;
        }

        let route_id = exchange.route().map(|r| r.id().to_string()).unwrap_or_default();
        tracing::warn!(
            route_id = %route_id,
            key = %key,
            replenish_rate = self.replenish_rate,
            burst_capacity = self.burst_capacity,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(&route_id);

        let out = exchange.response_mut();
        out.set_status(StatusCode::TOO_MANY_REQUESTS);
        out.clear_body();
        out.set_complete();
        Ok(())
    }
}

impl GatewayFilterFactory for RequestRateLimiterFilterFactory {
    fn name(&self) -> &'static str {
        "RequestRateLimiter"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        args.require_min(self.name(), 1)?;

        let replenish_rate: u32 = args
            .parse(self.name(), REPLENISH_RATE_KEY)?
            .ok_or_else(|| CompileError::MissingArgument {
                factory: self.name().to_string(),
                argument: REPLENISH_RATE_KEY.to_string(),
            })?;
        let burst_capacity: u32 = args
            .parse(self.name(), BURST_CAPACITY_KEY)?
            .unwrap_or(replenish_rate);

        if replenish_rate == 0 || burst_capacity == 0 {
            return Err(CompileError::filter(
                self.name(),
                "replenishRate and burstCapacity must be greater than zero",
            ));
        }

        let resolver = match args.get(KEY_RESOLVER_KEY) {
            Some(name) => self.resolvers.get(name).ok_or_else(|| {
                CompileError::filter(self.name(), format!("unknown key resolver '{}'", name))
            })?,
            None => self.resolvers.default_resolver().ok_or_else(|| {
                CompileError::filter(
                    self.name(),
                    format!("unknown default key resolver '{}'", self.resolvers.default_name()),
                )
            })?,
        };

        Ok(Arc::new(RequestRateLimiter {
            limiter: self.limiter.clone(),
            resolver,
            replenish_rate,
            burst_capacity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::chain::tests::{Log, Recording};
    use crate::filter::factory::FilterRegistry;
    use crate::filter::factory::tests::deps;
    use crate::filter::{GatewayRequest, OrderedFilter};
    use crate::rate_limit::tests::FailingStore;
    use crate::rate_limit::{
        InMemoryScriptStore, ManualClock, TokenBucketRateLimiter, PRINCIPAL_NAME_KEY_RESOLVER,
        REMOTE_ADDR_KEY_RESOLVER,
    };
    use crate::routing::args::TableExpressionResolver;
    use crate::routing::definition::FilterDefinition;
    use axum::http::{HeaderMap, Method};

    fn factory(store_up: bool) -> RequestRateLimiterFilterFactory {
        let limiter: Arc<dyn RateLimiter> = if store_up {
            Arc::new(TokenBucketRateLimiter::new(
                Arc::new(InMemoryScriptStore::new()),
                Arc::new(ManualClock::new(0)),
            ))
        } else {
            Arc::new(TokenBucketRateLimiter::new(Arc::new(FailingStore), Arc::new(ManualClock::new(0))))
        };
        RequestRateLimiterFilterFactory::new(
            limiter,
            Arc::new(KeyResolvers::with_defaults(REMOTE_ADDR_KEY_RESOLVER)),
        )
    }

    fn exchange_from(addr: &str) -> ServerExchange {
        ServerExchange::new(
            GatewayRequest::new(Method::GET, "/".parse().unwrap(), HeaderMap::new())
                .with_remote_addr(addr.parse().unwrap()),
        )
    }

    async fn run(filter: &Arc<dyn GatewayFilter>, log: &Log, exchange: &mut ServerExchange) {
        let filters = vec![
            OrderedFilter::new(filter.clone(), 1),
            OrderedFilter::new(Arc::new(Recording::new("backend", None, log)), 2),
        ];
        FilterChain::new(&filters).filter(exchange).await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_request_gets_429_and_never_reaches_backend() {
        let filter = factory(true)
            .apply(&BoundArgs::from([("replenishRate", "1"), ("burstCapacity", "1")]))
            .unwrap();
        let log: Log = Arc::default();

        let mut first = exchange_from("10.0.0.1:1000");
        run(&filter, &log, &mut first).await;
        assert_eq!(first.response().status(), None);

        let mut second = exchange_from("10.0.0.1:1001");
        run(&filter, &log, &mut second).await;
        assert_eq!(second.response().status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(second.response().is_committed());
        assert!(!second.response_mut().has_body());

        let mut other_client = exchange_from("10.0.0.2:1000");
        run(&filter, &log, &mut other_client).await;
        assert_eq!(other_client.response().status(), None);

        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_store_down_lets_requests_through() {
        let filter = factory(false)
            .apply(&BoundArgs::from([("replenishRate", "1")]))
            .unwrap();
        let log: Log = Arc::default();
        for _ in 0..3 {
            let mut ex = exchange_from("10.0.0.1:1000");
            run(&filter, &log, &mut ex).await;
            assert_eq!(ex.response().status(), None);
        }
    }

    #[tokio::test]
    async fn test_unresolvable_key_fails_the_request() {
        let filter = factory(true)
            .apply(&BoundArgs::from([
                ("replenishRate", "1"),
                ("keyResolver", PRINCIPAL_NAME_KEY_RESOLVER),
            ]))
            .unwrap();
        let filters = vec![OrderedFilter::new(filter, 1)];
        let mut ex = exchange_from("10.0.0.1:1000");
        let err = FilterChain::new(&filters).filter(&mut ex).await.unwrap_err();
        assert!(matches!(err, GatewayError::KeyResolution(_)));
    }

    #[test]
    fn test_compile_time_checks() {
        let factory = factory(true);
        assert!(factory.apply(&BoundArgs::default()).is_err());
        assert!(factory.apply(&BoundArgs::from([("replenishRate", "fast")])).is_err());
        assert!(factory.apply(&BoundArgs::from([("replenishRate", "0")])).is_err());
        assert!(factory
            .apply(&BoundArgs::from([("replenishRate", "1"), ("keyResolver", "nope")]))
            .is_err());
    }

    #[test]
    fn test_shorthand_with_resolver_expression() {
        let registry = FilterRegistry::with_defaults(deps());
        let defs: Vec<FilterDefinition> =
            vec!["RequestRateLimiter=10, 20, #{@principalNameKeyResolver}".parse().unwrap()];
        assert!(registry
            .resolve("limited", &defs, &TableExpressionResolver::default())
            .is_ok());
    }
}
