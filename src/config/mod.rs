//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CoreConfig (validated, immutable)
//!     → installed into ResilienceCore
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ResilienceCore::apply_config swaps the live Arc<CoreConfig>
//!     → breakers and wrappers created afterwards observe new defaults
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Existing breakers keep the thresholds they were created with

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::{
    BatchConfig, CacheConfig, CircuitBreakerSettings, CoreConfig, DedupConfig,
    LocalLayerConfig, ObservabilityConfig, RetryConfig, StoreConfig, TtlConfig,
};
