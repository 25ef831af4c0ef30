//! Hystrix: run the rest of the chain as a named, circuit-broken command.
//!
//! - Open breaker: answer immediately with an empty response
//! - Command deadline exceeded: 504
//! - Any other failure: counted, answered with an empty response

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{GatewayFilterFactory, NAME_KEY};
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry};
use crate::routing::args::{ArgumentHints, BoundArgs};

pub struct HystrixFilterFactory {
    breakers: Arc<CircuitBreakerRegistry>,
}

impl HystrixFilterFactory {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { breakers }
    }
}

impl ArgumentHints for HystrixFilterFactory {
    fn arg_names(&self) -> &'static [&'static str] {
        &[NAME_KEY]
    }
}

struct Hystrix {
    breaker: Arc<CircuitBreaker>,
}

impl Hystrix {
    fn complete_empty(exchange: &mut ServerExchange, status: StatusCode) {
        let response = exchange.response_mut();
        if response.is_committed() {
            return;
        }
        response.set_status(status);
        response.clear_body();
        response.set_complete();
    }
}

#[async_trait]
impl GatewayFilter for Hystrix {
    fn name(&self) -> &str {
        "Hystrix"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        if !self.breaker.allow_request().await {
            tracing::debug!(command = self.breaker.name(), "Circuit open, short-circuiting");
            Self::complete_empty(exchange, StatusCode::OK);
            return Ok(());
        }

        match tokio::time::timeout(self.breaker.timeout(), chain.filter(exchange)).await {
            Ok(Ok(())) => {
                self.breaker.record_success().await;
                Ok(())
            }
            Ok(Err(GatewayError::Timeout(_))) | Err(_) => {
                self.breaker.record_failure().await;
                tracing::warn!(
                    command = self.breaker.name(),
                    timeout_ms = self.breaker.timeout().as_millis() as u64,
                    "Command timed out"
                );
                Self::complete_empty(exchange, StatusCode::GATEWAY_TIMEOUT);
                Ok(())
            }
            Ok(Err(e)) => {
                self.breaker.record_failure().await;
                tracing::warn!(command = self.breaker.name(), error = %e, "Command failed, falling back");
                Self::complete_empty(exchange, StatusCode::OK);
                Ok(())
            }
        }
    }
}

impl GatewayFilterFactory for HystrixFilterFactory {
    fn name(&self) -> &'static str {
        "Hystrix"
    }

    fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let name = args.require(self.name(), NAME_KEY)?;
        if name.is_empty() {
            return Err(CompileError::filter(self.name(), "command name must not be empty"));
        }
        Ok(Arc::new(Hystrix {
            breaker: self.breakers.get(name),
        }))
    }
}
