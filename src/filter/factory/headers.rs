//! Header filters for the outbound request and the response.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};

use super::{header_name, header_value, GatewayFilterFactory, NAME_KEY, VALUE_KEY};
use crate::error::{CompileError, GatewayError};
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::routing::args::{ArgumentHints, BoundArgs};

/// Hop-by-hop headers stripped before forwarding.
pub const DEFAULT_NON_PROXY_HEADERS: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
];

fn name_and_value(factory: &str, args: &BoundArgs) -> Result<(HeaderName, HeaderValue), CompileError> {
    Ok((
        header_name(factory, args.require(factory, NAME_KEY)?)?,
        header_value(factory, args.require(factory, VALUE_KEY)?)?,
    ))
}

/// Where a header edit lands, and in which phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    /// Append to the outbound request (pre).
    AppendRequest,
    /// Remove from the outbound request (pre).
    RemoveRequest,
    /// Append to the response (pre, so backend headers of the same name replace it).
    AppendResponse,
    /// Replace on the response once the chain has completed (post).
    SetResponse,
    /// Remove from the response once the chain has completed (post).
    RemoveResponse,
}

struct HeaderFilter {
    label: &'static str,
    edit: Edit,
    name: HeaderName,
    value: Option<HeaderValue>,
}

#[async_trait]
impl GatewayFilter for HeaderFilter {
    fn name(&self) -> &str {
        self.label
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        match (self.edit, &self.value) {
            (Edit::AppendRequest, Some(value)) => {
                let request = exchange
                    .request()
                    .mutate()
                    .headers(|h| {
                        h.append(self.name.clone(), value.clone());
                    })
                    .build()?;
                exchange.set_request(request);
                chain.filter(exchange).await
            }
            (Edit::RemoveRequest, _) => {
                let request = exchange
                    .request()
                    .mutate()
                    .headers(|h| {
                        h.remove(&self.name);
                    })
                    .build()?;
                exchange.set_request(request);
                chain.filter(exchange).await
            }
            (Edit::AppendResponse, Some(value)) => {
                exchange
                    .response_mut()
                    .headers_mut()
                    .append(self.name.clone(), value.clone());
                chain.filter(exchange).await
            }
            (Edit::SetResponse, Some(value)) => {
                chain.filter(exchange).await?;
                exchange
                    .response_mut()
                    .headers_mut()
                    .insert(self.name.clone(), value.clone());
                Ok(())
            }
            (Edit::RemoveResponse, _) => {
                chain.filter(exchange).await?;
                exchange.response_mut().headers_mut().remove(&self.name);
                Ok(())
            }
            _ => chain.filter(exchange).await,
        }
    }
}

macro_rules! header_factory {
    ($factory:ident, $label:literal, $edit:expr, with_value) => {
        pub struct $factory;

        impl ArgumentHints for $factory {
            fn arg_names(&self) -> &'static [&'static str] {
                &[NAME_KEY, VALUE_KEY]
            }
        }

        impl GatewayFilterFactory for $factory {
            fn name(&self) -> &'static str {
                $label
            }

            fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
                let (name, value) = name_and_value(self.name(), args)?;
                Ok(Arc::new(HeaderFilter {
                    label: $label,
                    edit: $edit,
                    name,
                    value: Some(value),
                }))
            }
        }
    };
    ($factory:ident, $label:literal, $edit:expr, name_only) => {
        pub struct $factory;

        impl ArgumentHints for $factory {
            fn arg_names(&self) -> &'static [&'static str] {
                &[NAME_KEY]
            }
        }

        impl GatewayFilterFactory for $factory {
            fn name(&self) -> &'static str {
                $label
            }

            fn apply(&self, args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
                let name = header_name(self.name(), args.require(self.name(), NAME_KEY)?)?;
                Ok(Arc::new(HeaderFilter {
                    label: $label,
                    edit: $edit,
                    name,
                    value: None,
                }))
            }
        }
    };
}

header_factory!(AddRequestHeaderFilterFactory, "AddRequestHeader", Edit::AppendRequest, with_value);
header_factory!(AddResponseHeaderFilterFactory, "AddResponseHeader", Edit::AppendResponse, with_value);
header_factory!(SetResponseHeaderFilterFactory, "SetResponseHeader", Edit::SetResponse, with_value);
header_factory!(RemoveRequestHeaderFilterFactory, "RemoveRequestHeader", Edit::RemoveRequest, name_only);
header_factory!(RemoveResponseHeaderFilterFactory, "RemoveResponseHeader", Edit::RemoveResponse, name_only);

/// Strips hop-by-hop headers from the outbound request.
pub struct RemoveNonProxyHeadersFilterFactory {
    headers: Vec<String>,
}

impl RemoveNonProxyHeadersFilterFactory {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers }
    }
}

impl Default for RemoveNonProxyHeadersFilterFactory {
    fn default() -> Self {
        Self::new(DEFAULT_NON_PROXY_HEADERS.iter().map(|h| h.to_string()).collect())
    }
}

impl ArgumentHints for RemoveNonProxyHeadersFilterFactory {}

struct RemoveNonProxyHeaders {
    headers: Vec<HeaderName>,
}

#[async_trait]
impl GatewayFilter for RemoveNonProxyHeaders {
    fn name(&self) -> &str {
        "RemoveNonProxyHeaders"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let request = exchange
            .request()
            .mutate()
            .headers(|h| {
                for name in &self.headers {
                    h.remove(name);
                }
            })
            .build()?;
        exchange.set_request(request);
        chain.filter(exchange).await
    }
}

impl GatewayFilterFactory for RemoveNonProxyHeadersFilterFactory {
    fn name(&self) -> &'static str {
        "RemoveNonProxyHeaders"
    }

    fn apply(&self, _args: &BoundArgs) -> Result<Arc<dyn GatewayFilter>, CompileError> {
        let headers = self
            .headers
            .iter()
            .map(|h| header_name(self.name(), h))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(RemoveNonProxyHeaders { headers }))
    }
}
