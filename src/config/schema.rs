//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience core. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Circuit breaker defaults applied to newly created breakers.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Default retry policy.
    pub retry: RetryConfig,

    /// Request deduplication defaults and sweep cadence.
    pub dedup: DedupConfig,

    /// Batch processor defaults.
    pub batch: BatchConfig,

    /// Cache tiers and TTL classes.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before letting a probe through.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_factor: f64,

    /// Scale each delay by a random factor in [0.5, 1.0].
    pub jitter: bool,

    /// Optional per-attempt deadline in milliseconds.
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter: true,
            attempt_timeout_ms: None,
        }
    }
}

/// Request deduplication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    /// How long an in-flight entry may be joined, in seconds.
    pub ttl_secs: u64,

    /// Maximum callers sharing one in-flight execution.
    pub max_concurrent: usize,

    /// Interval of the background sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Entries older than this are removed by the sweep, in seconds.
    pub sweep_max_age_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            max_concurrent: 10,
            sweep_interval_secs: 60,
            sweep_max_age_secs: 30,
        }
    }
}

/// Batch processor configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,

    /// Milliseconds after the first queued item before a flush.
    pub batch_timeout_ms: u64,
}

impl BatchConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout_ms: 100,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Shared external key-value store.
    pub store: StoreConfig,

    /// In-process layer.
    pub local: LocalLayerConfig,

    /// TTL classes in seconds.
    pub ttl: TtlConfig,

    /// Interval of the store health probe in seconds.
    pub health_check_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            local: LocalLayerConfig::default(),
            ttl: TtlConfig::default(),
            health_check_interval_secs: 30,
        }
    }
}

/// External key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Use the external store at all.
    pub enabled: bool,

    /// Connection URL (e.g., "redis://127.0.0.1:6379").
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// In-process cache layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LocalLayerConfig {
    /// Enable the in-process layer.
    pub enabled: bool,

    /// Revalidation window of local entries in seconds.
    pub ttl_secs: u64,

    /// Upper bound on local entries; the entry closest to expiry is evicted beyond it.
    pub max_entries: usize,
}

impl Default for LocalLayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            max_entries: 10_000,
        }
    }
}

/// TTL classes in seconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TtlConfig {
    pub short: u64,
    pub medium: u64,
    pub long: u64,
    pub translation: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            short: 300,
            medium: 1800,
            long: 86_400,
            translation: 604_800,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
