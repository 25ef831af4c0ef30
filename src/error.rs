//! Gateway error types.
//!
//! Two families:
//! - [`CompileError`]: raised while turning route definitions into executable
//!   routes. Fatal for the table build that hit it.
//! - [`GatewayError`]: raised on the request path and surfaced to the client
//!   as a 5xx-class response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure while compiling a route definition.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unable to find RoutePredicateFactory with name {0}")]
    UnknownPredicateType(String),

    #[error("unable to find GatewayFilterFactory with name {0}")]
    UnknownFilterType(String),

    #[error("wrong number of arguments for {factory}: expected {expected:?}, found {found}")]
    ArgumentMismatch {
        factory: String,
        expected: Vec<String>,
        found: usize,
    },

    #[error("missing argument '{argument}' for {factory}")]
    MissingArgument { factory: String, argument: String },

    #[error("invalid predicate configuration for {predicate}: {reason}")]
    InvalidPredicateConfig { predicate: String, reason: String },

    #[error("invalid filter configuration for {filter}: {reason}")]
    InvalidFilterConfig { filter: String, reason: String },

    #[error("invalid destination '{uri}' for route {route_id}: {reason}")]
    InvalidDestination {
        route_id: String,
        uri: String,
        reason: String,
    },

    #[error("route {0} has no predicates")]
    NoPredicates(String),

    #[error("cannot evaluate expression '{0}'")]
    Expression(String),
}

impl CompileError {
    pub(crate) fn predicate(predicate: &str, reason: impl Into<String>) -> Self {
        CompileError::InvalidPredicateConfig {
            predicate: predicate.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn filter(filter: &str, reason: impl Into<String>) -> Self {
        CompileError::InvalidFilterConfig {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure on the request path.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No live instance for a load-balanced destination.
    #[error("unable to find instance for {0}")]
    NotFound(String),

    /// The backend call failed.
    #[error("downstream failure: {0}")]
    Downstream(String),

    /// The backend call did not complete in time.
    #[error("downstream timeout: {0}")]
    Timeout(String),

    /// A rate limiter key resolver could not produce a key.
    #[error("unable to resolve rate limiter key: {0}")]
    KeyResolution(String),

    /// A request was dispatched twice.
    #[error("route {existing} already bound to this request, refusing to bind {attempted}")]
    RouteAlreadyBound { existing: String, attempted: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A route definition source failed to produce definitions.
    #[error("route definition source failed: {0}")]
    Source(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status code the boundary answers with when this error escapes the chain.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Downstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
