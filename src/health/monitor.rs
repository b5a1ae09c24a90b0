//! Periodic store health probing.
//!
//! # Responsibilities
//! - Probe the external store on an interval
//! - Log reachability transitions once, not on every tick

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::cache::CacheLayer;
use crate::observability::metrics;

/// Shortest probe period; zero would spin.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct CacheHealthMonitor {
    cache: CacheLayer,
    interval: Duration,
    last_reachable: Option<bool>,
}

impl CacheHealthMonitor {
    pub fn new(cache: CacheLayer, interval: Duration) -> Self {
        Self {
            cache,
            interval: interval.max(MIN_INTERVAL),
            last_reachable: None,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if self.cache.store().is_none() {
            tracing::info!("No external cache store configured, health monitor idle");
            return;
        }

        tracing::info!(interval_secs = self.interval.as_secs(), "Cache health monitor starting");
        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe once; returns whether the store answered.
    pub async fn check(&mut self) -> bool {
        let health = self.cache.health().await;
        let reachable = health.store.reachable;

        match (self.last_reachable, reachable) {
            (Some(true), false) | (None, false) => {
                tracing::warn!(error = ?health.store.error, "Cache store unreachable");
            }
            (Some(false), true) => {
                tracing::info!(latency_ms = ?health.store.latency_ms, "Cache store reachable again");
            }
            _ => {}
        }

        self.last_reachable = Some(reachable);
        metrics::record_store_health(reachable);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::config::CacheConfig;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_monitor_probes_until_shutdown() {
        let cache = CacheLayer::new(Some(Arc::new(InMemoryStore::new())), &CacheConfig::default());
        let mut monitor = CacheHealthMonitor::new(cache.clone(), Duration::from_secs(30));
        assert!(monitor.check().await);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(CacheHealthMonitor::new(cache, Duration::from_secs(30)).run(rx));
        time::sleep(Duration::from_secs(90)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_kill_monitor() {
        let cache = CacheLayer::new(Some(Arc::new(InMemoryStore::new())), &CacheConfig::default());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(CacheHealthMonitor::new(cache, Duration::ZERO).run(rx));

        time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
