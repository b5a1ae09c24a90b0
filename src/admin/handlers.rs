use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::health::CacheHealth;
use crate::pipeline::ResilienceCore;
use crate::resilience::{CircuitBreakerStats, PendingRequestStats};

#[derive(Serialize)]
pub struct ResetResponse {
    pub name: String,
    pub reset: bool,
}

/// 503 when a configured store does not answer.
pub async fn get_cache_health(
    State(core): State<Arc<ResilienceCore>>,
) -> (StatusCode, Json<CacheHealth>) {
    let health = core.cache_health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub async fn get_breakers(
    State(core): State<Arc<ResilienceCore>>,
) -> Json<Vec<CircuitBreakerStats>> {
    Json(core.circuit_breaker_stats())
}

pub async fn reset_breaker(
    State(core): State<Arc<ResilienceCore>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ResetResponse>) {
    let reset = core.reset_circuit_breaker(&name);
    let status = if reset { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(ResetResponse { name, reset }))
}

pub async fn get_pending(
    State(core): State<Arc<ResilienceCore>>,
) -> Json<PendingRequestStats> {
    Json(core.pending_request_stats())
}
