//! Request Resilience Gateway (v1)
//!
//! Fronts an expensive AI-backed service with per-user admission control,
//! account lockout, single-flight response caching and bounded retries.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────────┐
//!                        │                    GATEWAY                          │
//!   Client Request       │  ┌────────┐   ┌────────────┐   ┌───────────────┐   │
//!   ─────────────────────┼─▶│  http  │──▶│  dispatch  │──▶│   security    │   │
//!                        │  │ server │   │ validation │   │ lockout, rate │   │
//!                        │  └────────┘   └────────────┘   └───────┬───────┘   │
//!                        │                                        ▼           │
//!                        │                                ┌───────────────┐   │
//!                        │                                │     cache     │   │
//!                        │                                │ single-flight │   │
//!                        │                                └───────┬───────┘   │
//!                        │                                        ▼           │
//!   Client Response      │  ┌──────────┐                  ┌───────────────┐   │
//!   ◀────────────────────┼──│ envelope │◀─────────────────│  resilience   │◀──┼── AI service
//!                        │  │  errors  │                  │ retry/timeout │   │
//!                        │  └──────────┘                  └───────────────┘   │
//!                        │                                                    │
//!                        │  config (hot reload) · observability · lifecycle   │
//!                        └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_gateway::config::watcher::ConfigWatcher;
use resilience_gateway::config::{load_config, GatewayConfig};
use resilience_gateway::dispatch::{Collaborators, Dispatcher};
use resilience_gateway::lifecycle::{shutdown_signal, Shutdown};
use resilience_gateway::observability::{logging, metrics};
use resilience_gateway::security::{JsonFileStore, SecurityStateStore};
use resilience_gateway::upstream::HttpDomainHandler;
use resilience_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "resilience-gateway", version, about)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilience-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        capacity = config.admission.capacity,
        lockout_threshold = config.lockout.threshold,
        max_retries = config.retries.max_retries,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let handler = Arc::new(HttpDomainHandler::new(&config.upstream)?);
    let mut collaborators = Collaborators::new(handler, &config);
    if let Some(path) = &config.lockout.store_path {
        let store: Arc<dyn SecurityStateStore> = Arc::new(JsonFileStore::open(path).await?);
        tracing::info!(path = %path, "Lockout state persisted to file");
        collaborators = collaborators.with_store(store);
    }

    let dispatcher = Arc::new(Dispatcher::new(&config, collaborators));
    for user_id in config.auth.credentials.keys() {
        dispatcher.register(user_id).await?;
    }

    let shutdown = Shutdown::new();

    // The watcher must stay alive for the lifetime of the server.
    let (_watcher, updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), Some(updates)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let sweeper = dispatcher.spawn_sweeper(
        Duration::from_secs(config.cache.sweep_interval_secs),
        shutdown.subscribe(),
    );

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(&config, dispatcher);
    server.run(listener, updates, shutdown.clone()).await?;

    let _ = sweeper.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
