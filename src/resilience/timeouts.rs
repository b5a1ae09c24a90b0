//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race a protected call against a per-attempt deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors (`ServiceError::Timeout`)
//! - A bounded attempt runs on its own task; on timeout only the caller stops
//!   waiting and the attempt keeps running to completion

use std::future::Future;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Run `fut` on a spawned task and wait for it at most `deadline`.
///
/// On timeout the task is detached, not aborted.
pub async fn with_timeout<T, Fut>(deadline: Duration, fut: Fut) -> ServiceResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = ServiceResult<T>> + Send + 'static,
{
    let mut attempt = tokio::spawn(fut);
    match tokio::time::timeout(deadline, &mut attempt).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ServiceError::other(format!("attempt task failed: {e}"))),
        Err(_) => {
            tracing::debug!(deadline_ms = deadline.as_millis() as u64, "Attempt deadline elapsed, leaving it running");
            Err(ServiceError::Timeout(deadline))
        }
    }
}

/// Apply `deadline` when present, otherwise await `fut` in place.
pub async fn maybe_timeout<T, Fut>(deadline: Option<Duration>, fut: Fut) -> ServiceResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = ServiceResult<T>> + Send + 'static,
{
    match deadline {
        Some(d) => with_timeout(d, fut).await,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServiceError>(1)
        };
        let err = with_timeout(Duration::from_secs(1), slow).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_runs_to_completion() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow = async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, ServiceError>(())
        };

        let err = with_timeout(Duration::from_secs(1), slow).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(Duration::from_secs(1)));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let fast = async { Err::<u8, _>(ServiceError::other("boom")) };
        let err = maybe_timeout(Some(Duration::from_secs(1)), fast).await.unwrap_err();
        assert_eq!(err, ServiceError::other("boom"));

        assert_eq!(maybe_timeout(None, async { Ok::<_, ServiceError>(7) }).await, Ok(7));
    }
}
