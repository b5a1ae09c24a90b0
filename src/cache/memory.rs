//! In-process implementation of [`KeyValueStore`].
//!
//! Behaves like a single Redis node for the commands the cache layer uses.
//! Expired entries are dropped lazily on access and during pattern deletes.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::key::glob_match;
use crate::cache::store::{CacheError, KeyValueStore};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) keys.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, e| e.is_expired());
        Ok(None)
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), CacheError> {
        if ttl_secs == 0 {
            return Err(CacheError::Command("invalid expire time in 'setex' command".into()));
        }
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut deleted = 0;
        self.entries.retain(|key, entry| {
            if entry.is_expired() {
                return false;
            }
            if glob_match(pattern, key) {
                deleted += 1;
                return false;
            }
            true
        });
        Ok(deleted)
    }

    async fn ping(&self) -> Result<String, CacheError> {
        Ok("PONG".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = InMemoryStore::new();
        store.set_ex("k", 300, "\"v\"").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"v\""));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_del_pattern_counts_matches() {
        let store = InMemoryStore::new();
        store.set_ex(r#"vocabulary:stats:["u1"]"#, 60, "1").await.unwrap();
        store.set_ex(r#"vocabulary:words:["u1",20]"#, 60, "2").await.unwrap();
        store.set_ex(r#"vocabulary:stats:["u2"]"#, 60, "3").await.unwrap();

        let deleted = store.del_pattern(r#"vocabulary:*"u1"*"#).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(r#"vocabulary:stats:["u2"]"#).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = InMemoryStore::new();
        assert!(matches!(store.set_ex("k", 0, "v").await, Err(CacheError::Command(_))));
        assert_eq!(store.ping().await.unwrap(), "PONG");
    }
}
