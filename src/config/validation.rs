//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, delays ordered, TTLs > 0)
//! - Check addresses and enumerated strings parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoreConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::CoreConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Validate a parsed configuration.
pub fn validate_config(config: &CoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if cb.reset_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.reset_timeout_secs", "must be > 0"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be > 0"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            format!("must be >= base_delay_ms ({})", retry.base_delay_ms),
        ));
    }
    if retry.backoff_factor.is_nan() || retry.backoff_factor < 1.0 {
        errors.push(ValidationError::new("retry.backoff_factor", "must be >= 1.0"));
    }
    if retry.attempt_timeout_ms == Some(0) {
        errors.push(ValidationError::new("retry.attempt_timeout_ms", "must be > 0 when set"));
    }

    let dedup = &config.dedup;
    if dedup.ttl_secs == 0 {
        errors.push(ValidationError::new("dedup.ttl_secs", "must be > 0"));
    }
    if dedup.max_concurrent == 0 {
        errors.push(ValidationError::new("dedup.max_concurrent", "must be > 0"));
    }
    if dedup.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("dedup.sweep_interval_secs", "must be > 0"));
    }

    if config.batch.batch_size == 0 {
        errors.push(ValidationError::new("batch.batch_size", "must be > 0"));
    }

    let ttl = &config.cache.ttl;
    for (field, value) in [
        ("cache.ttl.short", ttl.short),
        ("cache.ttl.medium", ttl.medium),
        ("cache.ttl.long", ttl.long),
        ("cache.ttl.translation", ttl.translation),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }
    if config.cache.local.enabled && config.cache.local.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.local.ttl_secs", "must be > 0 when enabled"));
    }
    if config.cache.store.enabled && config.cache.store.url.trim().is_empty() {
        errors.push(ValidationError::new("cache.store.url", "must not be empty when enabled"));
    }
    if config.cache.health_check_interval_secs == 0 {
        errors.push(ValidationError::new("cache.health_check_interval_secs", "must be > 0"));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if !LOG_FORMATS.contains(&obs.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected one of {:?}", LOG_FORMATS),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
