//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (request ID, tracing, timeout, concurrency cap)
//! - Turn each request into a `ServerExchange` and dispatch it
//! - Run matched exchanges through the filter chain
//! - Fall through to 404 when no route matches
//! - Record request metrics

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, FromRequestParts, State},
    http::{header, HeaderMap, HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::filter::{FilteringHandler, GatewayRequest, ServerExchange};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::Gateway;
use crate::observability::metrics;
use crate::routing::{Dispatch, Dispatcher};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub handler: Arc<FilteringHandler>,
    /// Header an upstream authenticator puts the principal name in.
    pub principal_header: Arc<ArcSwapOption<HeaderName>>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: &Gateway) -> Self {
        let config = gateway.config.load();
        let state = AppState {
            dispatcher: gateway.dispatcher.clone(),
            handler: gateway.handler.clone(),
            principal_header: gateway.principal_header.clone(),
        };

        Self {
            router: Self::build_router(
                Duration::from_secs(config.timeouts.request_secs),
                config.listener.max_connections,
                state,
            ),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(request_timeout: Duration, max_connections: usize, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(GlobalConcurrencyLimitLayer::new(max_connections.max(1)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for serving on a custom listener or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Dispatch the request and run it through the matched route's chain.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let request_id = request_id(&parts.headers).to_string();

    let upgrade = if is_websocket_upgrade(&parts.headers) {
        match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => Some(upgrade),
            Err(rejection) => {
                tracing::debug!(request_id = %request_id, error = %rejection, "Not a valid websocket upgrade");
                None
            }
        }
    } else {
        None
    };

    let mut exchange =
        ServerExchange::new(GatewayRequest::from_parts(&parts, Some(remote_addr))).with_body(body);
    if let Some(upgrade) = upgrade {
        exchange = exchange.with_upgrade(upgrade);
    }
    if let Some(name) = state.principal_header.load_full() {
        exchange.attributes_mut().principal = parts
            .headers
            .get(&*name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    let route_id = match state.dispatcher.dispatch(&mut exchange) {
        Ok(Dispatch::Matched(route)) => route.id().to_string(),
        Ok(Dispatch::NoRoute) => {
            tracing::debug!(request_id = %request_id, path = %parts.uri.path(), "No route matched");
            metrics::record_request(&method, 404, metrics::NO_ROUTE, start);
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch failed");
            metrics::record_request(&method, e.status_code().as_u16(), metrics::NO_ROUTE, start);
            return e.into_response();
        }
    };

    let response = match state.handler.handle(&mut exchange).await {
        Ok(()) => exchange.into_response(),
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                route_id = %route_id,
                error = %e,
                "Filter chain failed"
            );
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), &route_id, start);
    response
}
