//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → sweeper, health monitor, config watcher exit their loops
//!     → host flushes batch processors
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
