//! Resilience and caching core: circuit breakers, retries, request
//! deduplication, batching and a multi-tier cache with invalidation,
//! warming and health reporting.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;

pub use cache::{CacheLayer, CacheOptions, InMemoryStore, InvalidationScope, KeyValueStore, TtlClass};
pub use config::schema::CoreConfig;
pub use error::{ServiceError, ServiceResult};
pub use lifecycle::Shutdown;
pub use pipeline::{PipelineBuilder, ResilienceCore, ResilientFn};
pub use resilience::{
    BatchProcessor, CircuitBreaker, CircuitState, DedupOptions, RequestDeduplicator, ResilienceRegistry,
    RetryExecutor, RetryOptions,
};
