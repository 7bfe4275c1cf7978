//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges that would otherwise break
//! the token bucket, the backoff schedule or the SLA budgets. Returns all
//! errors, not just the first.

use std::fmt;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_payload_bytes == 0 {
        errors.push(ValidationError::new("listener.max_payload_bytes", "must be > 0"));
    }

    if config.admission.capacity == 0 {
        errors.push(ValidationError::new("admission.capacity", "must be > 0"));
    }
    if !(config.admission.refill_per_second.is_finite() && config.admission.refill_per_second > 0.0) {
        errors.push(ValidationError::new(
            "admission.refill_per_second",
            "must be a positive number",
        ));
    }

    if config.lockout.threshold == 0 {
        errors.push(ValidationError::new("lockout.threshold", "must be > 0"));
    }
    if config.lockout.duration_secs == 0 {
        errors.push(ValidationError::new("lockout.duration_secs", "must be > 0"));
    }

    let ttls = &config.cache.ttl_secs;
    if [ttls.explain, ttls.analyze, ttls.summarize, ttls.dashboard].contains(&0) {
        errors.push(ValidationError::new("cache.ttl_secs", "every TTL must be > 0"));
    }
    if config.cache.max_entries == Some(0) {
        errors.push(ValidationError::new("cache.max_entries", "must be > 0 when set"));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_secs", "must be > 0"));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if !(0.0..1.0).contains(&config.retries.jitter_ratio) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be in [0, 1)"));
    }
    if config.retries.budget_multiplier < 1.0 {
        errors.push(ValidationError::new("retries.budget_multiplier", "must be >= 1.0"));
    }

    let sla = &config.sla;
    if [sla.explain_ms, sla.analyze_ms, sla.summarize_ms, sla.dashboard_ms].contains(&0) {
        errors.push(ValidationError::new("sla", "every budget must be > 0"));
    }

    if url::Url::parse(&config.upstream.url).is_err() {
        errors.push(ValidationError::new(
            "upstream.url",
            format!("'{}' is not a valid URL", config.upstream.url),
        ));
    }

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be at least 16 characters when admin is enabled",
        ));
    }

    for (user, digest) in &config.auth.credentials {
        if digest.len() != 64 || hex::decode(digest).is_err() {
            errors.push(ValidationError::new(
                "auth.credentials",
                format!("digest for '{}' is not a hex SHA-256", user),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.admission.capacity = 0;
        config.admission.refill_per_second = 0.0;
        config.retries.jitter_ratio = 1.5;
        config.upstream.url = "not a url".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "admission.capacity",
                "admission.refill_per_second",
                "retries.jitter_ratio",
                "upstream.url"
            ]
        );
    }

    #[test]
    fn test_admin_key_required_when_enabled() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "short".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_sweep_interval_must_be_positive() {
        let mut config = GatewayConfig::default();
        config.cache.sweep_interval_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "cache.sweep_interval_secs");
    }
}
