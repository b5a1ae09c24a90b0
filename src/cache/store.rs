//! External key-value store abstraction.

use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to a key-value store. Never escapes the cache layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("cache value serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Minimal Redis-shaped command set the cache layer needs.
///
/// Values are UTF-8 strings (serialized JSON). TTLs are whole seconds.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl_secs`.
    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key matching a Redis glob pattern; returns how many went.
    async fn del_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Liveness probe. Redis answers `PONG`.
    async fn ping(&self) -> Result<String, CacheError>;
}
