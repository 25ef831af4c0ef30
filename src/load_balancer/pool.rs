//! Backend pool management.
//!
//! # Responsibilities
//! - Group backends by `lb://` group name
//! - Apply the configured strategy to select a backend
//! - Provide connection guards for tracking

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{BackendConfig, LoadBalancingStrategy};
use crate::load_balancer::{
    backend::{Backend, BackendConnectionGuard},
    least_conn::LeastConnections,
    round_robin::RoundRobin,
    LoadBalancer,
};

/// Backends by group, each group with its own selector state.
#[derive(Debug, Default)]
pub struct BackendManager {
    groups: HashMap<String, (Vec<Arc<Backend>>, Box<dyn LoadBalancer>)>,
}

impl BackendManager {
    pub fn new(configs: &[BackendConfig], strategy: LoadBalancingStrategy) -> Self {
        let mut grouped: HashMap<String, Vec<Arc<Backend>>> = HashMap::new();
        for config in configs {
            let backend = config
                .address
                .parse::<SocketAddr>()
                .map_err(|e| e.to_string())
                .and_then(|addr| {
                    Backend::new(config.name.clone(), addr, config.max_connections)
                        .map_err(|e| e.to_string())
                });
            match backend {
                Ok(backend) => grouped
                    .entry(config.group.clone())
                    .or_default()
                    .push(Arc::new(backend)),
                Err(e) => tracing::warn!(
                    backend = %config.name,
                    address = %config.address,
                    error = %e,
                    "Invalid backend address, skipping"
                ),
            }
        }

        let groups = grouped
            .into_iter()
            .map(|(name, backends)| {
                let lb: Box<dyn LoadBalancer> = match strategy {
                    LoadBalancingStrategy::RoundRobin => Box::new(RoundRobin::new()),
                    LoadBalancingStrategy::LeastConnections => Box::new(LeastConnections::new()),
                };
                (name, (backends, lb))
            })
            .collect();

        Self { groups }
    }

    /// Select a backend of `group` and reserve a slot on it.
    pub fn get(&self, group_name: &str) -> Option<BackendConnectionGuard> {
        let Some((backends, lb)) = self.groups.get(group_name) else {
            tracing::debug!(group = %group_name, "Group not found in BackendManager");
            return None;
        };

        let guard = lb.next_server(backends).and_then(|b| b.try_create_guard());
        if guard.is_none() {
            tracing::debug!(
                group = %group_name,
                backend_count = backends.len(),
                "No backend with spare capacity in group"
            );
        }
        guard
    }

    pub fn groups(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.groups
            .values()
            .flat_map(|(backends, _)| backends.iter())
            .cloned()
            .collect()
    }
}
