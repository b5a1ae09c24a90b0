//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a slow or unreliable dependency:
//!     → dedup.rs (join an identical in-flight call, or start one)
//!     → retries.rs (repeat retryable failures with backoff)
//!     → circuit_breaker.rs (reject fast while the dependency is unhealthy)
//!     → timeouts.rs (per-attempt deadline)
//!
//! Many small writes:
//!     → batch.rs (queue, flush by size or timer, fan results back out)
//! ```
//!
//! # Design Decisions
//! - Breakers and pending requests live in a `ResilienceRegistry` that callers
//!   inject; clones share state
//! - Every layer returns the dependency's own error unless it rejects by itself
//! - All timing goes through tokio's clock

pub mod backoff;
pub mod batch;
pub mod circuit_breaker;
pub mod dedup;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use batch::BatchProcessor;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use dedup::{DedupOptions, Deduplicated, PendingRequestStats, RequestDeduplicator};
pub use registry::ResilienceRegistry;
pub use retries::{RetryExecutor, RetryOptions};
