//! Per-request exchange state.
//!
//! # Responsibilities
//! - Hold the current request value (replaced wholesale on rewrite)
//! - Hold the response under construction and its committed flag
//! - Carry attributes shared between predicates and filters
//!   (bound route, template variables, request URL, already-routed flag)
//!
//! # Design Decisions
//! - `GatewayRequest` is never mutated in place; `mutate()` yields a builder
//!   and `set_request` swaps in the rebuilt value
//! - Bodies sit behind a `Mutex` slot so the exchange stays `Sync` and can be
//!   borrowed across `.await` points inside filters
//! - Everything is request-scoped; dropping the exchange discards partial
//!   rewrites

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::request::Parts;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri, Version};
use axum::response::Response;
use url::Url;

use crate::error::GatewayError;
use crate::load_balancer::BackendConnectionGuard;
use crate::routing::Route;

fn slot<T>(cell: &mut Mutex<Option<T>>) -> &mut Option<T> {
    cell.get_mut().unwrap_or_else(PoisonError::into_inner)
}

/// Immutable view of the (possibly rewritten) inbound request.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl GatewayRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers,
            remote_addr: None,
        }
    }

    /// Build from the head of an inbound HTTP request.
    pub fn from_parts(parts: &Parts, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            remote_addr,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Decoded query parameters in request order.
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self.uri.query() {
            Some(q) => url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cookies from every `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let value = value.trim().trim_matches('"');
                Some((name.trim().to_string(), value.to_string()))
            })
            .collect()
    }

    /// Host header value, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Absolute URL of this request as the client addressed it.
    pub fn url(&self) -> Option<Url> {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = self.host()?;
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Url::parse(&format!("{}://{}{}", scheme, host, path_and_query)).ok()
    }

    /// Start a rewrite of this request. The original value is left untouched.
    pub fn mutate(&self) -> RequestBuilder {
        RequestBuilder {
            method: self.method.clone(),
            scheme: self.uri.scheme().cloned(),
            authority: self.uri.authority().cloned(),
            path: self.uri.path().to_string(),
            query: self.uri.query().map(str::to_string),
            version: self.version,
            headers: self.headers.clone(),
            remote_addr: self.remote_addr,
        }
    }
}

/// Produces a new [`GatewayRequest`] from an existing one.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    scheme: Option<Scheme>,
    authority: Option<Authority>,
    path: String,
    query: Option<String>,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn headers(mut self, f: impl FnOnce(&mut HeaderMap)) -> Self {
        f(&mut self.headers);
        self
    }

    pub fn build(self) -> Result<GatewayRequest, GatewayError> {
        let path_and_query = match self.query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        };

        let mut builder = Uri::builder();
        if let (Some(scheme), Some(authority)) = (self.scheme, self.authority) {
            builder = builder.scheme(scheme).authority(authority);
        }
        let uri = builder
            .path_and_query(path_and_query.as_str())
            .build()
            .map_err(|e| {
                GatewayError::Internal(format!("invalid rewritten uri {}: {}", path_and_query, e))
            })?;

        Ok(GatewayRequest {
            method: self.method,
            uri,
            version: self.version,
            headers: self.headers,
            remote_addr: self.remote_addr,
        })
    }
}

/// Response under construction.
///
/// Once committed, the status can no longer be changed.
#[derive(Debug, Default)]
pub struct GatewayResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Mutex<Option<Body>>,
    committed: bool,
}

impl GatewayResponse {
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns false (and leaves the status alone) if already committed.
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.committed {
            tracing::warn!(
                status = %status,
                "Unable to set status code, response already committed"
            );
            return false;
        }
        self.status = Some(status);
        true
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Stage a body without committing.
    pub fn set_body(&mut self, body: Body) {
        *slot(&mut self.body) = Some(body);
    }

    pub fn has_body(&mut self) -> bool {
        slot(&mut self.body).is_some()
    }

    /// Drop any staged body.
    pub fn clear_body(&mut self) {
        *slot(&mut self.body) = None;
    }

    /// Complete the response with whatever body is staged (empty if none).
    pub fn set_complete(&mut self) {
        self.committed = true;
    }

    fn into_response(mut self) -> Response {
        let body = slot(&mut self.body).take().unwrap_or_else(Body::empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Attributes filters share for the lifetime of one request.
#[derive(Debug, Default)]
pub struct ExchangeAttributes {
    /// Variables captured by the Path predicate, e.g. `{segment}`.
    pub uri_template_variables: HashMap<String, String>,
    /// Where the request is headed, set by the route-to-URL filter.
    pub request_url: Option<Url>,
    /// Every URL the request had before a rewrite, oldest first, no duplicates.
    pub original_request_urls: Vec<Url>,
    /// Authenticated principal, when an upstream authenticator provided one.
    pub principal: Option<String>,
    /// Slot on the load-balanced backend, held until the exchange is dropped.
    pub backend: Option<BackendConnectionGuard>,
}

impl ExchangeAttributes {
    pub fn add_original_request_url(&mut self, url: Url) {
        if !self.original_request_urls.contains(&url) {
            self.original_request_urls.push(url);
        }
    }
}

impl ServerExchange {
    /// Remember the current request URL before a rewrite replaces it.
    pub fn record_original_request_url(&mut self) {
        if let Some(url) = self.request.url() {
            self.attributes.add_original_request_url(url);
        }
    }
}

/// One request travelling through the dispatcher and filter chain.
#[derive(Debug)]
pub struct ServerExchange {
    request: GatewayRequest,
    body: Mutex<Option<Body>>,
    upgrade: Mutex<Option<WebSocketUpgrade>>,
    upgrade_requested: bool,
    response: GatewayResponse,
    route: Option<Arc<Route>>,
    already_routed: bool,
    attributes: ExchangeAttributes,
}

impl ServerExchange {
    pub fn new(request: GatewayRequest) -> Self {
        Self {
            request,
            body: Mutex::new(None),
            upgrade: Mutex::new(None),
            upgrade_requested: false,
            response: GatewayResponse::default(),
            route: None,
            already_routed: false,
            attributes: ExchangeAttributes::default(),
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        *slot(&mut self.body) = Some(body);
        self
    }

    pub fn with_upgrade(mut self, upgrade: WebSocketUpgrade) -> Self {
        *slot(&mut self.upgrade) = Some(upgrade);
        self.upgrade_requested = true;
        self
    }

    pub fn request(&self) -> &GatewayRequest {
        &self.request
    }

    /// Replace the request with a rebuilt value.
    pub fn set_request(&mut self, request: GatewayRequest) {
        self.request = request;
    }

    /// Take the request body for forwarding. Later calls yield an empty body.
    pub fn take_body(&mut self) -> Body {
        slot(&mut self.body).take().unwrap_or_else(Body::empty)
    }

    pub fn is_upgrade_requested(&self) -> bool {
        self.upgrade_requested
    }

    pub fn take_upgrade(&mut self) -> Option<WebSocketUpgrade> {
        slot(&mut self.upgrade).take()
    }

    pub fn response(&self) -> &GatewayResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut GatewayResponse {
        &mut self.response
    }

    pub fn attributes(&self) -> &ExchangeAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut ExchangeAttributes {
        &mut self.attributes
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    /// Bind the matched route. Binding twice is an error.
    pub fn bind_route(&mut self, route: Arc<Route>) -> Result<(), GatewayError> {
        if let Some(existing) = &self.route {
            return Err(GatewayError::RouteAlreadyBound {
                existing: existing.id().to_string(),
                attempted: route.id().to_string(),
            });
        }
        self.route = Some(route);
        Ok(())
    }

    pub fn is_already_routed(&self) -> bool {
        self.already_routed
    }

    /// Check-and-set the already-routed flag. Returns false if another
    /// routing filter got there first.
    pub fn mark_routed(&mut self) -> bool {
        !std::mem::replace(&mut self.already_routed, true)
    }

    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}
