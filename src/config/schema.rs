//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::request::OperationKind;

/// Root configuration for the resilience gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Per-user token bucket settings.
    pub admission: AdmissionConfig,

    /// Failed-login lockout settings.
    pub lockout: LockoutConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Per-operation latency budgets.
    pub sla: SlaConfig,

    /// Domain handler endpoint.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Maximum serialized payload size accepted by the dispatcher.
    pub max_payload_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            max_payload_bytes: 512 * 1024,
        }
    }
}

/// Token bucket admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Enable admission control.
    pub enabled: bool,

    /// Bucket capacity (burst size).
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Seconds a full bucket may sit unused before the sweep drops it.
    pub idle_eviction_secs: u64,
}

impl AdmissionConfig {
    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            refill_per_second: 100.0 / 60.0, // 100 req/min
            idle_eviction_secs: 600,
        }
    }
}

/// Account lockout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins before the account locks.
    pub threshold: u32,

    /// How long a locked account stays locked, in seconds.
    pub duration_secs: u64,

    /// Optional JSON file mirroring lockout state across restarts.
    pub store_path: Option<String>,
}

impl LockoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            duration_secs: 15 * 60,
            store_path: None,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache. When disabled every request computes.
    pub enabled: bool,

    /// TTL per operation kind, in seconds.
    pub ttl_secs: OperationTtls,

    /// Maximum number of entries; `None` means unbounded.
    pub max_entries: Option<usize>,

    /// Interval of the memory-reclamation sweep, in seconds. Must be > 0.
    ///
    /// The same sweep drops idle admission buckets and lockout state.
    pub sweep_interval_secs: u64,

    /// How long expired entries are kept as stale fallbacks, in seconds.
    pub stale_retention_secs: u64,

    /// Include the user id in the fingerprint so users never share entries.
    pub per_user: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: OperationTtls::default(),
            max_entries: Some(10_000),
            sweep_interval_secs: 60,
            stale_retention_secs: 3600,
            per_user: false,
        }
    }
}

impl CacheConfig {
    /// TTL for results of the given operation.
    pub fn ttl_for(&self, kind: OperationKind) -> Duration {
        let secs = match kind {
            OperationKind::Explain => self.ttl_secs.explain,
            OperationKind::Analyze => self.ttl_secs.analyze,
            OperationKind::Summarize => self.ttl_secs.summarize,
            OperationKind::Dashboard => self.ttl_secs.dashboard,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationTtls {
    pub explain: u64,
    pub analyze: u64,
    pub summarize: u64,
    pub dashboard: u64,
}

impl Default for OperationTtls {
    fn default() -> Self {
        Self {
            explain: 3600,
            analyze: 300,
            summarize: 1800,
            dashboard: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_ratio: f64,

    /// Cumulative attempt + backoff time allowed, as a multiple of the SLA.
    pub budget_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_ratio: 0.1,
            budget_multiplier: 1.5,
        }
    }
}

/// Nominal latency SLA per operation, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SlaConfig {
    pub explain_ms: u64,
    pub analyze_ms: u64,
    pub summarize_ms: u64,
    pub dashboard_ms: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            explain_ms: 5_000,
            analyze_ms: 10_000,
            summarize_ms: 10_000,
            dashboard_ms: 2_000,
        }
    }
}

impl SlaConfig {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        let ms = match kind {
            OperationKind::Explain => self.explain_ms,
            OperationKind::Analyze => self.analyze_ms,
            OperationKind::Summarize => self.summarize_ms,
            OperationKind::Dashboard => self.dashboard_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Domain handler (AI service) endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URL receiving `POST {operation, payload, options}`.
    pub url: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Optional bearer token sent to the upstream.
    pub api_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9000/compute".to_string(),
            connect_timeout_ms: 1_000,
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoints configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Login credentials.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// user id -> hex SHA-256 digest of the password.
    pub credentials: HashMap<String, String>,
}
