//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by operation and outcome code
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_admission_total` (counter): admission decisions
//! - `gateway_cache_lookups_total` (counter): hit / miss / join / eviction
//! - `gateway_cache_entries` (gauge): entries held after the last sweep
//! - `gateway_retries_total` (counter): upstream retries by operation
//! - `gateway_lockout_events_total` (counter): lockout transitions
//!
//! # Design Decisions
//! - Recording before `init_metrics` is harmless (no recorder installed)
//! - Labels are low-cardinality: never user ids or fingerprints

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One finished gateway request. `code` is `"OK"` or the error code.
pub fn record_request(operation: &str, code: &str, start: Instant) {
    let labels = [
        ("operation", operation.to_string()),
        ("code", code.to_string()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_admission(allowed: bool) {
    let decision = if allowed { "allowed" } else { "denied" };
    ::metrics::counter!("gateway_admission_total", "decision" => decision).increment(1);
}

pub fn record_cache_lookup(result: &'static str) {
    ::metrics::counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    ::metrics::gauge!("gateway_cache_entries").set(entries as f64);
}

pub fn record_retry(operation: &str) {
    ::metrics::counter!("gateway_retries_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_lockout_event(event: &'static str) {
    ::metrics::counter!("gateway_lockout_events_total", "event" => event).increment(1);
}
