//! Failure injection: broken cache store, failing producers, open breakers.

use futures_util::future::join_all;
use resilient_cache::cache::{CacheLayer, CacheOptions, InvalidationScope};
use resilient_cache::config::CoreConfig;
use resilient_cache::error::{NetworkErrorCode, ServiceError};
use resilient_cache::{CircuitState, DedupOptions, ResilienceCore, RetryOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::{memory_core, Counter, FailingStore};

#[tokio::test]
async fn test_cache_store_failure_is_invisible() {
    let store = Arc::new(FailingStore::default());
    let mut config = CoreConfig::default();
    config.cache.local.enabled = false;
    let cache = CacheLayer::new(Some(store.clone()), &config.cache);

    let calls = Counter::default();
    let c = calls.clone();
    let wrapped = cache.cached(
        move |(id,): (String,)| {
            c.bump();
            async move { Ok(format!("value-{}", id)) }
        },
        CacheOptions::new("practice:words"),
    );

    assert_eq!(wrapped.call(("u1".into(),)).await.unwrap(), "value-u1");
    assert_eq!(wrapped.call(("u1".into(),)).await.unwrap(), "value-u1");
    assert_eq!(calls.get(), 2);
    // GET and SETEX attempted on each call.
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_invalidation_continues_past_failures() {
    let store = Arc::new(FailingStore::default());
    let core = ResilienceCore::new(CoreConfig::default(), Some(store.clone())).unwrap();

    let report = core.invalidate(InvalidationScope::User, "u1").await;
    assert_eq!(report.patterns.len(), 3);
    assert_eq!(report.failures, report.patterns);
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);

    let health = core.cache_health().await;
    assert!(health.store.configured);
    assert!(!health.store.reachable);
    assert!(health.store.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_network_errors() {
    let (core, _store) = memory_core(CoreConfig::default());
    let calls = Counter::default();
    let c = calls.clone();
    let translate = core
        .pipeline("translator", move |(text,): (String,)| {
            let n = c.bump();
            async move {
                if n < 3 {
                    Err(ServiceError::network(NetworkErrorCode::ConnectionReset, "peer reset"))
                } else {
                    Ok(format!("[{}]", text))
                }
            }
        })
        .retry(RetryOptions::api())
        .build();

    assert_eq!(translate.call(("hola".into(),)).await.unwrap(), "[hola]");
    assert_eq!(calls.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_short_circuits_pipeline() {
    let (core, _store) = memory_core(CoreConfig::default());
    let calls = Counter::default();
    let c = calls.clone();
    let query = core
        .pipeline("database", move |_: (u32,)| {
            c.bump();
            async { Err::<u32, _>(ServiceError::http(500, "boom")) }
        })
        .without_retry()
        .build();

    for _ in 0..5 {
        assert_eq!(query.call((1,)).await, Err(ServiceError::http(500, "boom")));
    }
    assert!(matches!(query.call((1,)).await, Err(ServiceError::CircuitOpen { .. })));
    assert_eq!(calls.get(), 5);

    tokio::time::advance(Duration::from_secs(61)).await;
    let _ = query.call((1,)).await;
    assert_eq!(calls.get(), 6);
    assert_eq!(core.circuit_breaker_stats()[0].state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_shares_rejection_through_pipeline() {
    let (core, _store) = memory_core(CoreConfig::default());
    let calls = Counter::default();
    let c = calls.clone();
    let lookup = core
        .pipeline("dictionary", move |(word,): (String,)| {
            c.bump();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<String, _>(ServiceError::http(404, format!("{} not found", word)))
            }
        })
        .dedup(DedupOptions::default())
        .build();

    let results = join_all((0..10).map(|_| lookup.call(("zzz".into(),)))).await;
    assert_eq!(calls.get(), 1);
    assert!(results
        .iter()
        .all(|r| *r == Err(ServiceError::http(404, "zzz not found"))));
    assert_eq!(core.pending_request_stats().total, 0);
}
