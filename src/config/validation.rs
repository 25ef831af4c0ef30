//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (`lb://` destinations reference existing groups)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Predicate and filter arguments are checked later, by route compilation

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::rate_limit::{PRINCIPAL_NAME_KEY_RESOLVER, REMOTE_ADDR_KEY_RESOLVER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route #{index} has an empty id")]
    EmptyRouteId { index: usize },

    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(String),

    #[error("route '{route}' has invalid uri '{uri}': {reason}")]
    InvalidRouteUri { route: String, uri: String, reason: String },

    #[error("route '{route}' references unknown backend group '{group}'")]
    UnknownBackendGroup { route: String, group: String },

    #[error("backend '{name}' has invalid address '{address}'")]
    InvalidBackendAddress { name: String, address: String },

    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("unknown key resolver '{0}'")]
    UnknownKeyResolver(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }
    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("rate_limiter.housekeeping_secs", config.rate_limiter.housekeeping_secs),
        ("circuit_breaker.timeout_ms", config.circuit_breaker.timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.max_connections",
        });
    }

    let resolver = config.rate_limiter.default_key_resolver.as_str();
    if resolver != REMOTE_ADDR_KEY_RESOLVER && resolver != PRINCIPAL_NAME_KEY_RESOLVER {
        errors.push(ValidationError::UnknownKeyResolver(resolver.to_string()));
    }

    let mut groups = HashSet::new();
    for backend in &config.backends {
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBackendAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
        groups.insert(backend.group.as_str());
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }

        match Url::parse(&route.uri) {
            Ok(uri) if uri.scheme() == "lb" => {
                let group = uri.host_str().unwrap_or_default();
                if !groups.contains(group) {
                    errors.push(ValidationError::UnknownBackendGroup {
                        route: route.id.clone(),
                        group: group.to_string(),
                    });
                }
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidRouteUri {
                route: route.id.clone(),
                uri: route.uri.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
