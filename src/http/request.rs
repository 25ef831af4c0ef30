//! Request ID handling.
//!
//! # Responsibilities
//! - Give every inbound request an `x-request-id` (UUID v4) unless the
//!   client already sent one
//! - Echo it on the response
//! - Expose it to the proxy handler for logging
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing; the set layer is the
//!   outermost one
//! - The header travels with the request, so backends see the same ID

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that assigns missing request IDs.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// The request ID, or `unknown` when the layers were not applied.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
