//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define resilience and cache metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `resilience_circuit_state` (gauge): 0=closed, 1=half-open, 2=open, per service
//! - `resilience_circuit_rejections_total` (counter): fast-failed calls, per service
//! - `resilience_retry_attempts_total` (counter): retries scheduled, per service
//! - `resilience_dedup_joins_total` (counter): callers that joined an in-flight call
//! - `resilience_dedup_pending` (gauge): in-flight deduplication entries
//! - `resilience_batch_size` (histogram): items per bulk call
//! - `cache_requests_total` (counter): by layer and result (hit/miss)
//! - `cache_backend_errors_total` (counter): store failures by operation
//! - `cache_invalidations_total` (counter): by scope
//! - `cache_store_health` (gauge): 1=reachable, 0=unreachable
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are low-cardinality (service names, layers, scopes; never keys)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics exporter listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
            false
        }
    }
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("resilience_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_circuit_rejection(service: &str) {
    counter!("resilience_circuit_rejections_total", "service" => service.to_string()).increment(1);
}

pub fn record_retry(service: &str) {
    counter!("resilience_retry_attempts_total", "service" => service.to_string()).increment(1);
}

pub fn record_dedup_join(namespace: &str) {
    counter!("resilience_dedup_joins_total", "namespace" => namespace.to_string()).increment(1);
}

pub fn record_dedup_pending(count: usize) {
    gauge!("resilience_dedup_pending").set(count as f64);
}

pub fn record_batch_size(size: usize) {
    histogram!("resilience_batch_size").record(size as f64);
}

pub fn record_cache_request(layer: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("cache_requests_total", "layer" => layer, "result" => result).increment(1);
}

pub fn record_cache_backend_error(operation: &'static str) {
    counter!("cache_backend_errors_total", "op" => operation).increment(1);
}

pub fn record_invalidation(scope: &'static str) {
    counter!("cache_invalidations_total", "scope" => scope).increment(1);
}

pub fn record_store_health(reachable: bool) {
    gauge!("cache_store_health").set(if reachable { 1.0 } else { 0.0 });
}
