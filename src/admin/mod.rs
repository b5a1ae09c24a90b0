//! Operational endpoints for dashboards.
//!
//! # Design Decisions
//! - Read-only apart from breaker reset
//! - Mounted by the host next to its own routes; no authentication here

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use self::handlers::*;
use crate::pipeline::ResilienceCore;

pub fn router(core: Arc<ResilienceCore>) -> Router {
    Router::new()
        .route("/health/cache", get(get_cache_health))
        .route("/resilience/breakers", get(get_breakers))
        .route("/resilience/breakers/{name}/reset", post(reset_breaker))
        .route("/resilience/pending", get(get_pending))
        .with_state(core)
}
