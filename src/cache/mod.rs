//! Cache subsystem.
//!
//! # Responsibilities
//! - Cache function results in an external key-value store and a local layer
//! - Invalidate by scope, warm by scope
//!
//! # Data Flow
//! ```text
//! layer.rs (Cached::call)
//!     → local.rs (process-local, short TTL)
//!     → store.rs (KeyValueStore: memory.rs or redis.rs)
//!
//! invalidation.rs → patterns + tags → store DEL pattern, local eviction
//! warming.rs      → registered read paths → join_all
//! ```
//!
//! # Design Decisions
//! - The cache is an accelerator: no store failure ever fails a caller
//! - Keys are `"{prefix}:{json(args)}"` (key.rs)

pub mod invalidation;
pub mod key;
pub mod layer;
pub mod local;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;
pub mod warming;

pub use invalidation::{InvalidationReport, InvalidationScope};
pub use key::cache_key;
pub use layer::{CacheLayer, CacheOptions, Cached, TagFn, TtlClass};
pub use local::LocalCache;
pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use store::{CacheError, KeyValueStore};
pub use warming::{CacheWarmer, WarmReport};
