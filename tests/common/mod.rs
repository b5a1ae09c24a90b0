//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_cache::cache::{CacheError, KeyValueStore};
use resilient_cache::config::CoreConfig;
use resilient_cache::{InMemoryStore, ResilienceCore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store whose every command fails, as if the server were gone.
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    fn fail(&self) -> CacheError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CacheError::Connection("connection refused".into())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(self.fail())
    }

    async fn set_ex(&self, _key: &str, _ttl_secs: u64, _value: &str) -> Result<(), CacheError> {
        Err(self.fail())
    }

    async fn del(&self, _key: &str) -> Result<(), CacheError> {
        Err(self.fail())
    }

    async fn del_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(self.fail())
    }

    async fn ping(&self) -> Result<String, CacheError> {
        Err(self.fail())
    }
}

/// Call counter shared with a producer closure.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Config with the local layer off so the external store is observable.
pub fn store_only_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.cache.local.enabled = false;
    config
}

/// Core backed by a fresh in-memory store; the store handle is returned too.
pub fn memory_core(config: CoreConfig) -> (Arc<ResilienceCore>, InMemoryStore) {
    let store = InMemoryStore::new();
    let core = ResilienceCore::new(config, Some(Arc::new(store.clone()))).unwrap();
    (Arc::new(core), store)
}
