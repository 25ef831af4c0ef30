//! Route refresh: re-pull definitions, recompile, swap.
//!
//! # Data Flow
//! ```text
//! config watcher ┐
//! admin API      ├→ RefreshTrigger (mpsc) → RouteRefresher
//! SIGHUP         ┘      → CachingRouteDefinitionLocator::refresh
//!                       → RouteTable::refresh
//!                       → on failure: definitions restored, old table kept
//! ```
//!
//! Refreshes hold one lock from the definitions swap to the table swap, so a
//! failed refresh never restores over a newer one.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::routing::source::CachingRouteDefinitionLocator;
use crate::routing::table::RouteTable;

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    ConfigReload,
    Admin,
    Signal,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshTrigger::ConfigReload => "config_reload",
            RefreshTrigger::Admin => "admin",
            RefreshTrigger::Signal => "signal",
        })
    }
}

pub type RefreshSender = mpsc::UnboundedSender<RefreshTrigger>;

pub struct RouteRefresher {
    definitions: Arc<CachingRouteDefinitionLocator>,
    table: Arc<RouteTable>,
    in_progress: Mutex<()>,
}

impl RouteRefresher {
    pub fn new(definitions: Arc<CachingRouteDefinitionLocator>, table: Arc<RouteTable>) -> Self {
        Self {
            definitions,
            table,
            in_progress: Mutex::new(()),
        }
    }

    /// Refresh both caches. Returns the new table generation.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<u64, GatewayError> {
        let _serialized = self.in_progress.lock().await;
        let previous = match self.definitions.refresh().await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(trigger = %trigger, error = %e, "Route refresh failed, keeping current routes");
                metrics::record_route_refresh("failure");
                return Err(e);
            }
        };

        match self.table.refresh().await {
            Ok(_) => {
                let current = self.table.snapshot();
                tracing::info!(
                    trigger = %trigger,
                    generation = current.generation(),
                    routes = current.routes().len(),
                    "Routes refreshed"
                );
                metrics::record_route_refresh("success");
                Ok(current.generation())
            }
            Err(e) => {
                self.definitions.restore(previous);
                tracing::error!(trigger = %trigger, error = %e, "Route refresh failed, keeping current routes");
                metrics::record_route_refresh("failure");
                Err(e)
            }
        }
    }

    /// Serve refresh requests until shutdown or until every sender is gone.
    pub fn spawn(
        self: Arc<Self>,
        mut triggers: mpsc::UnboundedReceiver<RefreshTrigger>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    trigger = triggers.recv() => match trigger {
                        Some(trigger) => {
                            let _ = self.refresh(trigger).await;
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!("Route refresher stopped");
        })
    }
}
