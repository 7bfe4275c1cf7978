//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request id, tracing, body limit)
//! - Apply reloaded configuration to the running dispatcher
//! - Serve until shutdown, then drain in-flight requests

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{AdminConfig, GatewayConfig};
use crate::dispatch::Dispatcher;
use crate::http::handlers;
use crate::lifecycle::Shutdown;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub admin: Arc<ArcSwap<AdminConfig>>,
}

/// HTTP front end of the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState {
            dispatcher,
            admin: Arc::new(ArcSwap::from_pointee(config.admin.clone())),
        };
        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::new(request_id));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/v1/operations/{kind}", post(handlers::run_operation))
            .route("/v1/login", post(handlers::login))
            .merge(admin::router(state.clone()))
            .with_state(state)
            // Enforced by the extractors, so oversized bodies become envelopes.
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(middleware)
    }

    /// The router, for serving it elsewhere (e.g. tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` triggers.
    ///
    /// Configurations arriving on `config_updates` are applied to the running
    /// components without restarting.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_updates(self.state.clone(), updates, shutdown.clone()));
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_updates(
    state: AppState,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    state.dispatcher.reconfigure(&config);
                    state.admin.store(Arc::new(config.admin.clone()));
                    tracing::info!("Configuration reloaded");
                }
                None => break,
            },
            _ = stop.recv() => break,
        }
    }
}
