//! Request dispatcher.
//!
//! # Responsibilities
//! - Run the checks in cost-ascending order, stopping at the first failure
//! - Route admitted requests through the single-flight cache and the retry loop
//! - Soften exhausted upstream failures into stale successes when possible
//! - Normalize every failure into a [`GatewayError`]
//!
//! # Design Decisions
//! - The dispatcher owns no mutable request state; every component it calls
//!   keeps its own keyed store
//! - Runtime settings sit behind `ArcSwap` so a reload never blocks a request

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::{fingerprint, CacheError, CacheLimits, CacheStats, LookupSource, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, GatewayConfig, SlaConfig};
use crate::dispatch::errors::{ErrorCode, GatewayError};
use crate::dispatch::request::{GatewayRequest, GatewayResponse, OperationKind};
use crate::observability::metrics;
use crate::resilience::RetryOrchestrator;
use crate::security::{
    AccountSecurityState, Admission, AdmissionController, CredentialVerifier, LockoutStateMachine,
    NullStore, SecurityStateStore, StaticCredentials,
};
use crate::upstream::DomainHandler;

/// The external collaborators a dispatcher is built around.
pub struct Collaborators {
    pub handler: Arc<dyn DomainHandler>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn SecurityStateStore>,
}

impl Collaborators {
    /// Configured credentials, system clock, in-memory lockout state.
    pub fn new(handler: Arc<dyn DomainHandler>, config: &GatewayConfig) -> Self {
        Self {
            handler,
            credentials: Arc::new(StaticCredentials::from_hex(&config.auth.credentials)),
            clock: Arc::new(SystemClock),
            store: Arc::new(NullStore),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SecurityStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialVerifier>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Settings read per request.
#[derive(Debug, Clone)]
struct DispatchSettings {
    cache: CacheConfig,
    sla: SlaConfig,
    max_payload_bytes: usize,
}

impl DispatchSettings {
    fn from_config(config: &GatewayConfig) -> Self {
        Self {
            cache: config.cache.clone(),
            sla: config.sla.clone(),
            max_payload_bytes: config.listener.max_payload_bytes,
        }
    }
}

fn cache_limits(config: &CacheConfig) -> CacheLimits {
    CacheLimits {
        max_entries: config.max_entries,
        stale_retention: Duration::from_secs(config.stale_retention_secs),
    }
}

/// Aggregate runtime statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub tracked_users: usize,
    pub tracked_accounts: usize,
    pub cache: CacheStats,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries: usize,
    pub buckets: usize,
    pub accounts: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.cache_entries + self.buckets + self.accounts
    }
}

pub struct Dispatcher {
    admission: AdmissionController,
    lockout: LockoutStateMachine,
    cache: Arc<ResponseCache<Value, GatewayError>>,
    retry: Arc<RetryOrchestrator>,
    handler: Arc<dyn DomainHandler>,
    credentials: Arc<dyn CredentialVerifier>,
    settings: ArcSwap<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(config: &GatewayConfig, collaborators: Collaborators) -> Self {
        Self {
            admission: AdmissionController::new(config.admission.clone()),
            lockout: LockoutStateMachine::new(
                config.lockout.clone(),
                collaborators.clock,
                collaborators.store,
            ),
            cache: Arc::new(ResponseCache::new(cache_limits(&config.cache))),
            retry: Arc::new(RetryOrchestrator::new(config.retries.clone())),
            handler: collaborators.handler,
            credentials: collaborators.credentials,
            settings: ArcSwap::from_pointee(DispatchSettings::from_config(config)),
        }
    }

    /// Handle one operation request.
    pub async fn handle(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let start = Instant::now();
        let result = self.dispatch(&request).await;

        let code = match &result {
            Ok(_) => "OK",
            Err(e) => e.code.as_str(),
        };
        metrics::record_request(request.operation.as_str(), code, start);

        if let Err(e) = &result {
            if e.code == ErrorCode::InternalError {
                tracing::error!(
                    user_id = %request.user_id,
                    operation = %request.operation,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    details = ?e.details,
                    "Request failed with internal error"
                );
            }
        }
        result
    }

    async fn dispatch(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let settings = self.settings.load_full();

        // 1. Validation
        let options = validate(request, settings.max_payload_bytes)?;

        // 2. Lockout
        self.lockout.check(&request.user_id).await?;

        // 3. Admission
        if let Admission::Denied { retry_after_ms } = self.admission.try_acquire(&request.user_id) {
            return Err(GatewayError::rate_limited(retry_after_ms));
        }

        // 4. Cache / compute
        let operation = request.operation;
        let sla = settings.sla.for_kind(operation);
        let payload = Arc::new(request.payload.clone());
        let options = Arc::new(options);

        if !settings.cache.enabled {
            let value = self
                .compute(&request.user_id, operation, sla, payload, options)
                .await?;
            return Ok(GatewayResponse {
                result: Arc::new(value),
                stale: false,
                cache: LookupSource::Computed,
            });
        }

        let scope = settings.cache.per_user.then_some(request.user_id.as_str());
        let key = fingerprint(operation, &payload, &options, scope);
        let ttl = settings.cache.ttl_for(operation);

        let compute = {
            let handler = Arc::clone(&self.handler);
            let retry = Arc::clone(&self.retry);
            let user_id = request.user_id.clone();
            move || run_upstream(handler, retry, user_id, operation, sla, payload, options)
        };

        match self.cache.get_or_compute(&key, ttl, compute).await {
            Ok(lookup) => Ok(GatewayResponse {
                result: lookup.value,
                stale: false,
                cache: lookup.source,
            }),
            Err(CacheError {
                error,
                stale: Some(value),
            }) if error.allows_stale_fallback() => {
                tracing::warn!(
                    user_id = %request.user_id,
                    operation = %operation,
                    code = %error.code,
                    "Upstream unavailable, serving stale value"
                );
                metrics::record_cache_lookup("stale");
                Ok(GatewayResponse {
                    result: value,
                    stale: true,
                    cache: LookupSource::Stale,
                })
            }
            Err(CacheError { error, .. }) => Err(error),
        }
    }

    async fn compute(
        &self,
        user_id: &str,
        operation: OperationKind,
        sla: Duration,
        payload: Arc<Value>,
        options: Arc<Value>,
    ) -> Result<Value, GatewayError> {
        run_upstream(
            Arc::clone(&self.handler),
            Arc::clone(&self.retry),
            user_id.to_string(),
            operation,
            sla,
            payload,
            options,
        )
        .await
    }

    /// Evaluate a login attempt against the lockout state machine.
    pub async fn login(&self, user_id: &str, password: &str) -> Result<(), GatewayError> {
        if user_id.trim().is_empty() {
            return Err(GatewayError::invalid_request("user_id must not be empty"));
        }
        let credentials = Arc::clone(&self.credentials);
        self.lockout
            .authenticate(user_id, || credentials.verify(user_id, password))
            .await?;
        tracing::info!(user_id = %user_id, "Login succeeded");
        Ok(())
    }

    /// Create the lockout state for a known account.
    pub async fn register(&self, user_id: &str) -> Result<(), GatewayError> {
        self.lockout.register(user_id).await?;
        Ok(())
    }

    pub async fn account(&self, user_id: &str) -> Result<AccountSecurityState, GatewayError> {
        Ok(self.lockout.snapshot(user_id).await?)
    }

    pub async fn unlock(&self, user_id: &str) -> Result<(), GatewayError> {
        self.lockout.unlock(user_id).await?;
        Ok(())
    }

    /// Apply a reloaded configuration to every component.
    ///
    /// Credentials and the upstream handler are fixed at startup.
    pub fn reconfigure(&self, config: &GatewayConfig) {
        self.admission.reconfigure(config.admission.clone());
        self.lockout.reconfigure(config.lockout.clone());
        self.retry.reconfigure(config.retries.clone());
        self.cache.reconfigure(cache_limits(&config.cache));
        self.settings
            .store(Arc::new(DispatchSettings::from_config(config)));
        tracing::info!("Dispatcher reconfigured");
    }

    /// Reclaim memory: long-expired cache entries, idle admission buckets
    /// and lockout state with nothing to remember. Never changes a decision.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            cache_entries: self.cache.sweep(),
            buckets: self.admission.sweep_idle(),
            accounts: self.lockout.sweep_idle(),
        };
        metrics::record_cache_size(self.cache.len());
        report
    }

    /// Run [`Dispatcher::sweep`] every `interval` until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = dispatcher.sweep();
                        if report.total() > 0 {
                            tracing::debug!(
                                cache_entries = report.cache_entries,
                                buckets = report.buckets,
                                accounts = report.accounts,
                                "Sweep reclaimed idle state"
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Value, GatewayError>> {
        &self.cache
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            tracked_users: self.admission.tracked_users(),
            tracked_accounts: self.lockout.tracked_accounts(),
            cache: self.cache.stats(),
        }
    }
}

/// One logical upstream call: retries, timeouts, normalization.
async fn run_upstream(
    handler: Arc<dyn DomainHandler>,
    retry: Arc<RetryOrchestrator>,
    user_id: String,
    operation: OperationKind,
    sla: Duration,
    payload: Arc<Value>,
    options: Arc<Value>,
) -> Result<Value, GatewayError> {
    let start = Instant::now();
    retry
        .execute(operation.as_str(), sla, |timeout| {
            handler.compute(operation, &payload, &options, timeout)
        })
        .await
        .map_err(|e| {
            tracing::warn!(
                user_id = %user_id,
                operation = %operation,
                attempts = e.attempts(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Upstream call failed"
            );
            GatewayError::from(e)
        })
}

/// Check the request shape. Returns the options normalized to an object.
fn validate(request: &GatewayRequest, max_payload_bytes: usize) -> Result<Value, GatewayError> {
    if request.user_id.trim().is_empty() {
        return Err(GatewayError::invalid_request("user_id must not be empty"));
    }
    if !request.payload.is_object() {
        return Err(GatewayError::validation("payload must be a JSON object"));
    }
    let options = match &request.options {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => request.options.clone(),
        _ => return Err(GatewayError::validation("options must be a JSON object")),
    };

    let size = serde_json::to_vec(&request.payload)
        .map_err(|_| GatewayError::internal())?
        .len();
    if size > max_payload_bytes {
        return Err(GatewayError::validation("payload too large")
            .with_details(json!({ "size": size, "limit": max_payload_bytes })));
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payload: Value) -> GatewayRequest {
        GatewayRequest::new("alice", OperationKind::Explain, payload)
    }

    #[test]
    fn test_validate_user_id() {
        let mut req = request(json!({}));
        req.user_id = "  ".into();
        let err = validate(&req, 1024).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_validate_payload_shape_and_size() {
        let err = validate(&request(json!([1, 2])), 1024).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let big = json!({ "text": "x".repeat(2048) });
        let err = validate(&request(big), 1024).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.details.unwrap()["limit"], json!(1024));
    }

    #[test]
    fn test_validate_normalizes_options() {
        let options = validate(&request(json!({"a": 1})), 1024).unwrap();
        assert_eq!(options, json!({}));

        let req = request(json!({})).with_options(json!({"depth": 2}));
        assert_eq!(validate(&req, 1024).unwrap(), json!({"depth": 2}));

        let req = request(json!({})).with_options(json!("fast"));
        assert_eq!(
            validate(&req, 1024).unwrap_err().code,
            ErrorCode::ValidationError
        );
    }
}
