//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::filter::factory::DEFAULT_NON_PROXY_HEADERS;
use crate::rate_limit::REMOTE_ADDR_KEY_RESOLVER;
use crate::routing::definition::{FilterDefinition, RouteDefinition};

/// Root configuration for the gateway.
///
/// Read once at startup: `listener`, `timeouts`, `observability`,
/// `admin.enabled`, `admin.bind_address` and `rate_limiter.housekeeping_secs`.
/// Everything else takes effect on hot reload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Route definitions.
    pub routes: Vec<RouteDefinition>,

    /// Filters prepended to every route's own filters.
    pub default_filters: Vec<FilterDefinition>,

    /// Settings for individual built-in filters.
    pub filters: FiltersConfig,

    /// RequestRateLimiter settings.
    pub rate_limiter: RateLimiterConfig,

    /// Breaker settings for the Hystrix filter.
    pub circuit_breaker: CircuitBreakerConfig,

    /// How `lb://` groups pick an instance.
    pub load_balancer: LoadBalancerConfig,

    /// Backend instances behind `lb://group` destinations.
    pub backends: Vec<BackendConfig>,

    /// Values `#{name}` argument expressions resolve to.
    pub expressions: HashMap<String, String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            routes: Vec::new(),
            default_filters: vec![FilterDefinition::new(
                "RemoveNonProxyHeaders",
                Default::default(),
            )],
            filters: FiltersConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            backends: Vec::new(),
            expressions: HashMap::new(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub remove_non_proxy_headers: RemoveNonProxyHeadersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoveNonProxyHeadersConfig {
    /// Headers stripped from every forwarded request.
    pub headers: Vec<String>,
}

impl Default for RemoveNonProxyHeadersConfig {
    fn default() -> Self {
        Self {
            headers: DEFAULT_NON_PROXY_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Key resolver used when a RequestRateLimiter names none.
    pub default_key_resolver: String,

    /// Interval between sweeps of expired buckets, in seconds.
    pub housekeeping_secs: u64,

    /// Request header an upstream authenticator puts the principal name in.
    pub principal_header: Option<String>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_key_resolver: REMOTE_ADDR_KEY_RESOLVER.to_string(),
            housekeeping_secs: 60,
            principal_header: None,
        }
    }
}

/// Circuit breaker configuration, shared by all Hystrix commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Deadline for the guarded part of the chain, in milliseconds.
    pub timeout_ms: u64,

    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u64,

    /// Seconds the breaker stays open before probing.
    pub open_secs: u64,

    /// Successful trial calls needed to close again.
    pub success_threshold: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            failure_threshold: 5,
            open_secs: 5,
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
    LeastConnections,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalancingStrategy,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Group this server belongs to; routes reach it via `lb://{group}`.
    pub group: String,

    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Maximum concurrent requests to this backend.
    #[serde(default = "default_max_backend_conns")]
    pub max_connections: usize,
}

fn default_max_backend_conns() -> usize {
    100
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.default_filters.len(), 1);
        assert_eq!(config.default_filters[0].name, "RemoveNonProxyHeaders");
        assert_eq!(config.circuit_breaker.timeout_ms, 1000);
        assert_eq!(config.rate_limiter.default_key_resolver, REMOTE_ADDR_KEY_RESOLVER);
        assert_eq!(config.load_balancer.strategy, LoadBalancingStrategy::RoundRobin);
    }

    #[test]
    fn test_routes_accept_both_definition_forms() {
        let config: GatewayConfig = toml::from_str(
            r#"
            default_filters = []

            [[routes]]
            id = "users"
            uri = "lb://users"
            order = 2
            predicates = ["Path=/users/**", { name = "Method", args = { method = "GET" } }]
            filters = [
                "PrefixPath=/api",
                { name = "RequestRateLimiter", args = { replenishRate = 10, burstCapacity = 20 } },
            ]

            [[backends]]
            name = "users-1"
            group = "users"
            address = "127.0.0.1:3001"

            [load_balancer]
            strategy = "least_connections"
            "#,
        )
        .unwrap();

        assert!(config.default_filters.is_empty());
        let route = &config.routes[0];
        assert_eq!(route.order, 2);
        assert_eq!(route.predicates[0].args.get("_genkey_0"), Some("/users/**"));
        assert_eq!(route.predicates[1].args.get("method"), Some("GET"));
        assert_eq!(route.filters[1].args.get("replenishRate"), Some("10"));
        assert_eq!(config.backends[0].max_connections, 100);
        assert_eq!(config.load_balancer.strategy, LoadBalancingStrategy::LeastConnections);
    }
}
