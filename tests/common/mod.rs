//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resilience_gateway::clock::Clock;
use resilience_gateway::config::GatewayConfig;
use resilience_gateway::dispatch::{Collaborators, Dispatcher, OperationKind};
use resilience_gateway::security::StaticCredentials;
use resilience_gateway::upstream::{DomainFailure, DomainHandler};
use resilience_gateway::{GatewayServer, Shutdown};

pub const PASSWORD: &str = "correct-horse";
pub const ADMIN_KEY: &str = "test-admin-key-0123456789";

type Respond = dyn Fn(u32, OperationKind, &Value) -> Result<Value, DomainFailure> + Send + Sync;

/// Domain handler driven by a closure of (call index, operation, payload).
pub struct ScriptedHandler {
    calls: AtomicU32,
    delay: Duration,
    respond: Box<Respond>,
}

impl ScriptedHandler {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(u32, OperationKind, &Value) -> Result<Value, DomainFailure> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            respond: Box::new(respond),
        }
    }

    /// Echoes the request and the call index.
    pub fn echo() -> Self {
        Self::new(|call, operation, payload| {
            Ok(json!({ "operation": operation, "payload": payload, "call": call }))
        })
    }

    /// Fails the first `n` calls with `failure`, then echoes.
    pub fn failing_first(n: u32, failure: DomainFailure) -> Self {
        Self::new(move |call, operation, payload| {
            if call < n {
                Err(failure.clone())
            } else {
                Ok(json!({ "operation": operation, "payload": payload, "call": call }))
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainHandler for ScriptedHandler {
    async fn compute(
        &self,
        operation: OperationKind,
        payload: &Value,
        _options: &Value,
        _timeout: Duration,
    ) -> Result<Value, DomainFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(call, operation, payload)
    }
}

/// Defaults plus one known account ("alice") and an enabled admin surface.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config.auth.credentials = HashMap::from([(
        "alice".to_string(),
        StaticCredentials::digest(PASSWORD),
    )]);
    config
}

pub fn dispatcher(
    config: &GatewayConfig,
    handler: Arc<dyn DomainHandler>,
    clock: Arc<dyn Clock>,
) -> Arc<Dispatcher> {
    let collaborators = Collaborators::new(handler, config).with_clock(clock);
    Arc::new(Dispatcher::new(config, collaborators))
}

/// Serve `dispatcher` on an ephemeral port.
pub async fn start_gateway(
    config: &GatewayConfig,
    dispatcher: Arc<Dispatcher>,
) -> (SocketAddr, Shutdown) {
    serve(config, dispatcher, None).await
}

/// Like [`start_gateway`], also returning the sender the server applies
/// reloaded configurations from.
pub async fn start_reloadable_gateway(
    config: &GatewayConfig,
    dispatcher: Arc<Dispatcher>,
) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<GatewayConfig>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (addr, shutdown) = serve(config, dispatcher, Some(rx)).await;
    (addr, shutdown, tx)
}

async fn serve(
    config: &GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config, dispatcher);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, updates, server_shutdown).await;
    });
    (addr, shutdown)
}

/// Start a programmable AI-service stub. `f` maps the call index to a
/// status and JSON body. Returns the compute URL and the call counter.
pub async fn start_upstream<F>(f: F) -> (String, Arc<AtomicU32>)
where
    F: Fn(u32) -> (u16, Value) + Send + Sync + 'static,
{
    #[derive(Clone)]
    struct Stub {
        calls: Arc<AtomicU32>,
        respond: Arc<dyn Fn(u32) -> (u16, Value) + Send + Sync>,
    }

    async fn compute(State(stub): State<Stub>, Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
        let call = stub.calls.fetch_add(1, Ordering::SeqCst);
        let (status, body) = (stub.respond)(call);
        (StatusCode::from_u16(status).unwrap(), Json(body))
    }

    let calls = Arc::new(AtomicU32::new(0));
    let stub = Stub {
        calls: calls.clone(),
        respond: Arc::new(f),
    };
    let app = Router::new().route("/compute", post(compute)).with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/compute", addr), calls)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
