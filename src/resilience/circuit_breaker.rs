//! Circuit breaker for downstream service protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - Half-Open: testing if service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: now - last_failure > reset_timeout
//! Half-Open → Closed: HALF_OPEN_SUCCESS_THRESHOLD consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker, shared through the registry by name
//! - Fail fast in Open state; the operation is never invoked
//! - The lock is released while the operation runs
//! - The underlying error is always returned unchanged

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::observability::metrics;

/// Consecutive half-open successes required to close the circuit.
pub const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 3;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ago_ms: Option<u64>,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
        }
    }
}

/// A circuit breaker guarding one named service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `operation` under the breaker.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    /// Admit or reject a call, moving Open → Half-Open once the window elapsed.
    fn try_acquire(&self) -> ServiceResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner
            .last_failure
            .map(|t| t.elapsed() > self.config.reset_timeout)
            .unwrap_or(true);

        if !elapsed {
            drop(inner);
            metrics::record_circuit_rejection(&self.name);
            return Err(ServiceError::CircuitOpen {
                service: self.name.clone(),
            });
        }

        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        drop(inner);

        tracing::info!(service = %self.name, "Circuit breaker half-open, probing service");
        metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;

        if inner.state != CircuitState::HalfOpen {
            return;
        }

        inner.success_count += 1;
        if inner.success_count >= HALF_OPEN_SUCCESS_THRESHOLD {
            inner.state = CircuitState::Closed;
            inner.success_count = 0;
            drop(inner);

            tracing::info!(service = %self.name, "Circuit breaker closed");
            metrics::record_circuit_state(&self.name, CircuitState::Closed);
        }
    }

    fn on_failure(&self, error: &ServiceError) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let was = inner.state;
        let trip = was == CircuitState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;

        if trip && was != CircuitState::Open {
            inner.state = CircuitState::Open;
            inner.success_count = 0;
            let failures = inner.failure_count;
            drop(inner);

            tracing::warn!(
                service = %self.name,
                failures,
                from = ?was,
                error = %error,
                "Circuit breaker opened"
            );
            metrics::record_circuit_state(&self.name, CircuitState::Open);
        }
    }

    /// Return to Closed with zeroed counters.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        tracing::info!(service = %self.name, "Circuit breaker reset");
        metrics::record_circuit_state(&self.name, CircuitState::Closed);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_ago_ms: inner.last_failure.map(|t| t.elapsed().as_millis() as u64),
            failure_threshold: self.config.failure_threshold,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
        }
    }
}
