//! Forwards the request to an `http`/`https` backend.
//!
//! # Design Decisions
//! - Guarded by the already-routed flag so a request is sent at most once
//! - The backend response is stored on the exchange uncommitted; post-phase
//!   filters can still edit status and headers before it is written
//! - Hop-by-hop response headers are dropped; the server reframes the body

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderName, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::TimeoutConfig;
use crate::error::GatewayError;
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};
use crate::resilience::with_timeout;

/// Response headers that describe the backend connection, not the payload.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::TE,
        header::TRAILER,
        header::UPGRADE,
    ]
    .contains(name)
}

pub type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

pub struct HttpRoutingFilter {
    client: BackendClient,
    request_timeout: Duration,
}

impl HttpRoutingFilter {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            request_timeout: Duration::from_secs(timeouts.request_secs),
        }
    }
}

#[async_trait]
impl GatewayFilter for HttpRoutingFilter {
    fn name(&self) -> &str {
        "HttpRouting"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let url = match &exchange.attributes().request_url {
            Some(url) if matches!(url.scheme(), "http" | "https") => url.clone(),
            _ => return chain.filter(exchange).await,
        };
        if !exchange.mark_routed() {
            return chain.filter(exchange).await;
        }

        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| GatewayError::Internal(format!("invalid request url {}: {}", url, e)))?;

        let inbound = exchange.request();
        let mut builder = Request::builder()
            .method(inbound.method().clone())
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in inbound.headers() {
                if name != header::HOST {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        let body = exchange.take_body();
        let outbound = builder
            .body(body)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        tracing::debug!(url = %url, method = %outbound.method(), "Forwarding to backend");
        let response = with_timeout(self.request_timeout, "backend request", async {
            self.client
                .request(outbound)
                .await
                .map_err(|e| GatewayError::Downstream(format!("{}: {}", url, e)))
        })
        .await?;

        let (parts, body) = response.into_parts();
        let out = exchange.response_mut();
        out.set_status(parts.status);
        let headers = out.headers_mut();
        for name in parts.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &parts.headers {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        out.set_body(Body::new(body));

        chain.filter(exchange).await
    }
}
