//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM/SIGINT and turn them into a shutdown
//! - Turn SIGHUP into a route refresh
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a refresh, not a shutdown

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::routing::{RefreshSender, RefreshTrigger};

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Send a refresh on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_refresh_on_sighup(
    refresh: RefreshSender,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP received, refreshing routes");
                    if refresh.send(RefreshTrigger::Signal).is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_refresh_on_sighup(
    _refresh: RefreshSender,
    _shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async {})
}
