//! Process-wide resilience state behind an injectable handle.
//!
//! # Responsibilities
//! - Create circuit breakers lazily per service name and share them
//! - Own the pending-request registry used by deduplication
//! - Report and reset breaker state for operators
//!
//! # Design Decisions
//! - Cheap to clone; clones share state
//! - Tests build isolated registries; `global()` exists for hosts that want
//!   one registry per process
//! - State is per process and is not synchronised across instances

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::resilience::dedup::{PendingRequestStats, RequestDeduplicator};

#[derive(Clone)]
pub struct ResilienceRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    breaker_defaults: Arc<ArcSwap<CircuitBreakerConfig>>,
    deduplicator: RequestDeduplicator,
}

impl ResilienceRegistry {
    pub fn new(breaker_defaults: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            breaker_defaults: Arc::new(ArcSwap::from_pointee(breaker_defaults)),
            deduplicator: RequestDeduplicator::new(),
        }
    }

    /// Registry shared by the whole process.
    pub fn global() -> &'static ResilienceRegistry {
        static GLOBAL: OnceLock<ResilienceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ResilienceRegistry::default)
    }

    /// Breaker for `service`, created with the current defaults on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return existing.clone();
        }
        let config = **self.breaker_defaults.load();
        self.breaker_with(service, config)
    }

    /// Breaker for `service`, created with `config` if it does not exist yet.
    pub fn breaker_with(&self, service: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(service = %service, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(service, config))
            })
            .clone()
    }

    /// Change the thresholds used for breakers created from now on.
    pub fn set_breaker_defaults(&self, config: CircuitBreakerConfig) {
        self.breaker_defaults.store(Arc::new(config));
    }

    pub fn breaker_defaults(&self) -> CircuitBreakerConfig {
        **self.breaker_defaults.load()
    }

    /// Stats of every known breaker, ordered by name.
    pub fn circuit_breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|b| b.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Drop the breaker for `service`; the next call starts from Closed.
    ///
    /// Returns false when no breaker with that name exists.
    pub fn reset_circuit_breaker(&self, service: &str) -> bool {
        match self.breakers.remove(service) {
            Some((_, breaker)) => {
                // Holders of the old handle see a closed circuit too.
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn deduplicator(&self) -> &RequestDeduplicator {
        &self.deduplicator
    }

    pub fn pending_request_stats(&self) -> PendingRequestStats {
        self.deduplicator.stats()
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
