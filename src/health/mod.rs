//! Cache health reporting.
//!
//! # Data Flow
//! ```text
//! On demand (CacheLayer::health):
//!     PING external store with a deadline
//!     → StoreHealth + local layer status → CacheHealth
//!
//! Periodic (monitor.rs):
//!     Ticker → probe → log reachability changes → gauge
//! ```
//!
//! # Design Decisions
//! - Health is informational; it never gates request traffic
//! - A missing store reports `configured: false`, not unreachable

pub mod monitor;

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::CacheLayer;

pub use monitor::CacheHealthMonitor;

/// Deadline of one store probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreHealth {
    pub configured: bool,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub store: StoreHealth,
    pub local_layer_enabled: bool,
    pub local_entries: usize,
}

impl CacheHealth {
    /// True when every configured component answers.
    pub fn is_healthy(&self) -> bool {
        !self.store.configured || self.store.reachable
    }
}

impl CacheLayer {
    pub async fn health(&self) -> CacheHealth {
        let store = match self.store() {
            None => StoreHealth {
                configured: false,
                reachable: false,
                latency_ms: None,
                error: None,
            },
            Some(store) => {
                let started = Instant::now();
                let outcome = tokio::time::timeout(PROBE_TIMEOUT, store.ping()).await;
                let latency_ms = Some(started.elapsed().as_millis() as u64);
                match outcome {
                    Ok(Ok(_)) => StoreHealth {
                        configured: true,
                        reachable: true,
                        latency_ms,
                        error: None,
                    },
                    Ok(Err(e)) => StoreHealth {
                        configured: true,
                        reachable: false,
                        latency_ms,
                        error: Some(e.to_string()),
                    },
                    Err(_) => StoreHealth {
                        configured: true,
                        reachable: false,
                        latency_ms,
                        error: Some(format!("ping timed out after {}ms", PROBE_TIMEOUT.as_millis())),
                    },
                }
            }
        };

        CacheHealth {
            store,
            local_layer_enabled: self.local().is_some(),
            local_entries: self.local().map_or(0, |l| l.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::config::CacheConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reachable_store() {
        let layer = CacheLayer::new(Some(Arc::new(InMemoryStore::new())), &CacheConfig::default());
        let health = layer.health().await;
        assert!(health.store.configured && health.store.reachable);
        assert!(health.local_layer_enabled);
        assert!(health.is_healthy());
    }

    #[tokio::test]
    async fn test_unconfigured_store() {
        let health = CacheLayer::disabled().health().await;
        assert!(!health.store.configured);
        assert!(!health.local_layer_enabled);
        assert!(health.is_healthy());
    }
}
