//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failure is retryable (typed error taxonomy)
//! - Execute retries with exponential backoff + jitter
//! - Route every attempt through the service's circuit breaker
//!
//! # Design Decisions
//! - Jittered backoff prevents thundering herd
//! - The last underlying error is surfaced unchanged; exhaustion is not a
//!   separate error kind
//! - A breaker rejection is an ordinary failure to the retry condition

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{DatabaseErrorKind, ServiceError, ServiceResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::registry::ResilienceRegistry;
use crate::resilience::timeouts::maybe_timeout;

/// Decides whether `error` after `attempt` (1-based) should be retried.
pub type RetryCondition = Arc<dyn Fn(&ServiceError, u32) -> bool + Send + Sync>;

/// Invoked before sleeping with the failed attempt and the chosen delay.
pub type RetryHook = Arc<dyn Fn(&ServiceError, u32, Duration) + Send + Sync>;

/// Hard ceiling applied by the default retry condition.
const DEFAULT_CONDITION_MAX_ATTEMPTS: u32 = 5;

/// Generic failures are only retried below this attempt.
const GENERIC_RETRY_ATTEMPTS: u32 = 3;

fn retryable_status(status: u16) -> bool {
    (500..600).contains(&status) || status == 429 || status == 408
}

/// Default policy: HTTP 5xx/429/408 and network failures retry, other 4xx
/// never do, anything else retries for the first attempts only.
pub fn default_retry_condition(error: &ServiceError, attempt: u32) -> bool {
    if attempt >= DEFAULT_CONDITION_MAX_ATTEMPTS {
        return false;
    }
    match error {
        ServiceError::Http { status, .. } => retryable_status(*status),
        ServiceError::Network { .. } | ServiceError::Timeout(_) => true,
        _ => attempt < GENERIC_RETRY_ATTEMPTS,
    }
}

/// Policy of the API preset.
pub fn api_retry_condition(error: &ServiceError, _attempt: u32) -> bool {
    match error {
        ServiceError::Http { status, .. } => retryable_status(*status),
        ServiceError::Network { .. } | ServiceError::Timeout(_) => true,
        _ => false,
    }
}

/// Policy of the database preset: connection and timeout failures only.
pub fn database_retry_condition(error: &ServiceError, _attempt: u32) -> bool {
    match error {
        ServiceError::Database { kind, .. } => {
            matches!(kind, DatabaseErrorKind::Connection | DatabaseErrorKind::Timeout)
        }
        ServiceError::Network { .. } | ServiceError::Timeout(_) => true,
        _ => false,
    }
}

/// Retry options.
#[derive(Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    /// Per-attempt deadline.
    pub timeout: Option<Duration>,
    pub retry_condition: RetryCondition,
    pub on_retry: Option<RetryHook>,
}

impl RetryOptions {
    /// External API calls: 3 attempts, 1s–10s, 30s per attempt.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
            timeout: Some(Duration::from_secs(30)),
            retry_condition: Arc::new(api_retry_condition),
            on_retry: None,
        }
    }

    /// Database operations: 5 attempts, 0.5s–5s ×1.5, 10s per attempt.
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
            jitter: true,
            timeout: Some(Duration::from_secs(10)),
            retry_condition: Arc::new(database_retry_condition),
            on_retry: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
            timeout: config.attempt_timeout_ms.map(Duration::from_millis),
            ..Self::default()
        }
    }

    pub fn with_retry_condition(
        mut self,
        condition: impl Fn(&ServiceError, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_condition = Arc::new(condition);
        self
    }

    pub fn with_on_retry(mut self, hook: impl Fn(&ServiceError, u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay scheduled after `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay,
            self.max_delay,
            self.backoff_factor,
            self.jitter,
        )
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
            timeout: None,
            retry_condition: Arc::new(default_retry_condition),
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

/// Bounded retry around the shared circuit breaker of a service.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    registry: ResilienceRegistry,
}

impl RetryExecutor {
    pub fn new(registry: ResilienceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ResilienceRegistry {
        &self.registry
    }

    /// Run `operation` with retries, each attempt through the breaker of
    /// `service_name` and raced against `options.timeout`. An attempt that
    /// misses its deadline is left running in the background.
    pub async fn with_retry<T, F, Fut>(
        &self,
        service_name: &str,
        options: &RetryOptions,
        mut operation: F,
    ) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>> + Send + 'static,
    {
        let breaker = self.registry.breaker(service_name);
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = breaker
                .execute(|| maybe_timeout(options.timeout, operation()))
                .await;

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(service = %service_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts || !(options.retry_condition)(&error, attempt) {
                if attempt > 1 {
                    tracing::warn!(
                        service = %service_name,
                        attempts = attempt,
                        error = %error,
                        "Giving up after retries"
                    );
                }
                return Err(error);
            }

            let delay = options.delay_for(attempt);
            if let Some(hook) = &options.on_retry {
                hook(&error, attempt, delay);
            }
            tracing::debug!(
                service = %service_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after failure"
            );
            metrics::record_retry(service_name);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
