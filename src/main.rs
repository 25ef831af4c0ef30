//! API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ routing::Dispatcher ──▶ filter::FilteringHandler
//!                                     │                      │
//!                                     ▼                      ▼
//!                              RouteTable snapshot     route filters (RequestRateLimiter,
//!                                     ▲                 PrefixPath, Hystrix, ...)
//!                                     │                      │
//!          config watcher ─┐          │                      ▼
//!          admin API ──────┼─▶ RouteRefresher          global filters ──▶ Backend
//!          SIGHUP ─────────┘                          (route-to-url, lb, http/ws routing)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_gateway::admin::setup_admin_router;
use api_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use api_gateway::lifecycle::{shutdown_signal, spawn_refresh_on_sighup, Gateway, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::routing::RefreshTrigger;
use api_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "API gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        backends = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::builder(config.clone()).build().await?;
    let shutdown = Shutdown::new();
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

    let mut tasks = vec![
        Arc::clone(&gateway.refresher).spawn(refresh_rx, shutdown.subscribe()),
        gateway.spawn_housekeeping(shutdown.subscribe()),
        spawn_refresh_on_sighup(refresh_tx.clone(), shutdown.subscribe()),
    ];

    // Hot reload: swap the config in, then refresh routes from it.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let gateway = gateway.clone();
            let refresh_tx = refresh_tx.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    gateway.apply_config(next);
                    if refresh_tx.send(RefreshTrigger::ConfigReload).is_err() {
                        break;
                    }
                }
            }));
            Some(watcher.run()?)
        }
        None => None,
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(gateway.clone());
        let stop = shutdown.wait();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, admin).with_graceful_shutdown(stop).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&gateway);
    let trigger = shutdown.clone();
    server
        .run(listener, async move {
            shutdown_signal().await;
            trigger.trigger();
        })
        .await?;

    shutdown.trigger();
    drop(refresh_tx);
    for task in tasks {
        task.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
