//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rate_limited_total` (counter): requests denied by the limiter
//! - `gateway_rate_limiter_fail_open_total` (counter): store failures let through
//! - `gateway_route_refresh_total` (counter): route table rebuilds by result
//! - `gateway_circuit_breaker_open_total` (counter): breaker trips by name
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Route label used when the request matched nothing.
pub const NO_ROUTE: &str = "none";

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(metrics_address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!("gateway_requests_total", "Requests handled, by route and status");
    describe_histogram!(
        "gateway_request_duration_seconds",
        Unit::Seconds,
        "Time from accept to response, by route"
    );
    describe_counter!("gateway_rate_limited_total", "Requests denied by RequestRateLimiter");
    describe_counter!(
        "gateway_rate_limiter_fail_open_total",
        "Rate limiter store failures that admitted the request"
    );
    describe_counter!("gateway_route_refresh_total", "Route table refreshes, by result");
    describe_counter!("gateway_circuit_breaker_open_total", "Circuit breaker trips, by name");
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route: &str) {
    counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_rate_limiter_fail_open() {
    counter!("gateway_rate_limiter_fail_open_total").increment(1);
}

/// `result` is `success` or `failure`.
pub fn record_route_refresh(result: &'static str) {
    counter!("gateway_route_refresh_total", "result" => result).increment(1);
}

pub fn record_circuit_open(name: &str) {
    counter!("gateway_circuit_breaker_open_total", "name" => name.to_string()).increment(1);
}
