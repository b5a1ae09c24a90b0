//! Process-local cache layer in front of the external store.
//!
//! # Design Decisions
//! - Holds the already-serialized value so a local hit and a store hit
//!   deserialize the same bytes
//! - Its own TTL governs revalidation, independent of the store TTL
//! - Tags are kept per entry; eviction by tag is a scan
//! - At capacity the entry closest to expiry is evicted

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::key::glob_match;
use crate::config::LocalLayerConfig;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: Instant,
    tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LocalCache {
    entries: Arc<DashMap<String, LocalEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl LocalCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &LocalLayerConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(key, |_, e| Instant::now() >= e.expires_at);
        None
    }

    pub fn insert(&self, key: &str, value: String, tags: &[String]) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                expires_at: Instant::now() + self.ttl,
                tags: tags.to_vec(),
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key matching a Redis glob.
    pub fn remove_matching(&self, pattern: &str) -> u64 {
        self.remove_where(|key, _| glob_match(pattern, key))
    }

    /// Drop every entry carrying `tag`.
    pub fn invalidate_tag(&self, tag: &str) -> u64 {
        self.remove_where(|_, entry| entry.tags.iter().any(|t| t == tag))
    }

    pub fn clear(&self) -> u64 {
        let count = self.entries.len() as u64;
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_where(&self, mut predicate: impl FnMut(&str, &LocalEntry) -> bool) -> u64 {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if predicate(key, entry) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn evict_one(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
        if self.entries.len() < self.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}
