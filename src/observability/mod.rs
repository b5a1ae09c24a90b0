//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON collectors)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Breaker transitions and cache degradation are always logged
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

use crate::config::ObservabilityConfig;

/// Install logging, and the Prometheus exporter when enabled.
///
/// Must be called from within a Tokio runtime when metrics are enabled.
pub fn init(config: &ObservabilityConfig) {
    logging::init_logging(config);
    if !config.metrics_enabled {
        return;
    }
    match config.metrics_address.parse() {
        Ok(addr) => {
            metrics::init_metrics(addr);
        }
        Err(e) => {
            tracing::error!(address = %config.metrics_address, error = %e, "Invalid metrics address");
        }
    }
}
