//! End-to-end cache behaviour of a stats read path.

use resilient_cache::cache::{CacheOptions, InvalidationScope, KeyValueStore, TtlClass};
use resilient_cache::config::CoreConfig;
use resilient_cache::ServiceResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

mod common;

use common::{memory_core, store_only_config, Counter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VocabularyStats {
    total: u32,
    learned: u32,
}

async fn fetch_stats(counter: Counter, user_id: String) -> ServiceResult<VocabularyStats> {
    let n = counter.bump() as u32;
    assert_eq!(user_id, "u1");
    Ok(VocabularyStats { total: 40 + n, learned: n })
}

#[tokio::test(start_paused = true)]
async fn test_stats_cached_until_invalidated() {
    let (core, store) = memory_core(CoreConfig::default());
    let calls = Counter::default();
    let c = calls.clone();
    let stats = core.cache().cached(
        move |(user_id,): (String,)| fetch_stats(c.clone(), user_id),
        CacheOptions::new("vocabulary:stats")
            .ttl(TtlClass::Custom(300))
            .tag_by_first_arg("vocabulary"),
    );

    let first = stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(store.ttl(r#"vocabulary:stats:["u1"]"#), Some(Duration::from_secs(300)));

    tokio::time::advance(Duration::from_secs(120)).await;
    let second = stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(calls.get(), 1);

    let report = core
        .invalidate("vocabulary".parse::<InvalidationScope>().unwrap(), "u1")
        .await;
    assert!(report.failures.is_empty());
    assert!(report.deleted >= 1);
    assert!(store.is_empty());

    let third = stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(calls.get(), 2);
    assert_ne!(third, first);
}

#[tokio::test(start_paused = true)]
async fn test_store_entry_expires_after_ttl() {
    let (core, _store) = memory_core(store_only_config());
    let calls = Counter::default();
    let c = calls.clone();
    let stats = core.cache().cached(
        move |(user_id,): (String,)| fetch_stats(c.clone(), user_id),
        CacheOptions::new("vocabulary:stats").ttl(TtlClass::Short),
    );

    stats.call(("u1".into(),)).await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(calls.get(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_round_trip_then_absent_key_is_a_miss() {
    let (core, store) = memory_core(store_only_config());
    let cache = core.cache();

    cache.set("k", &json!({"a": 1}), TtlClass::Custom(60), &[]).await;
    assert_eq!(cache.get::<serde_json::Value>("k").await, Some(json!({"a": 1})));

    store.del("k").await.unwrap();
    assert_eq!(cache.get::<serde_json::Value>("k").await, None);

    let calls = Counter::default();
    let c = calls.clone();
    let wrapped = cache.cached(
        move |_: ()| {
            c.bump();
            async { Ok(json!({"a": 1})) }
        },
        CacheOptions::new("k"),
    );
    wrapped.call(()).await.unwrap();
    store.del("k:null").await.unwrap();
    wrapped.call(()).await.unwrap();
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_user_scope_clears_every_owned_domain() {
    let (core, store) = memory_core(CoreConfig::default());
    let cache = core.cache();
    cache.set(r#"vocabulary:stats:["u1"]"#, &1, TtlClass::Short, &[]).await;
    cache.set(r#"practice:words:["u1",20]"#, &2, TtlClass::Short, &[]).await;
    cache.set(r#"vocabulary:stats:["u2"]"#, &3, TtlClass::Short, &[]).await;

    core.invalidate(InvalidationScope::User, "u1").await;

    assert_eq!(store.len(), 1);
    assert_eq!(cache.get::<i32>(r#"vocabulary:stats:["u2"]"#).await, Some(3));
    assert_eq!(cache.get::<i32>(r#"practice:words:["u1",20]"#).await, None);
}

#[tokio::test]
async fn test_warming_populates_cache() {
    let (core, store) = memory_core(store_only_config());
    let calls = Counter::default();
    let c = calls.clone();
    let stats = core.cache().cached(
        move |(user_id,): (String,)| fetch_stats(c.clone(), user_id),
        CacheOptions::new("vocabulary:stats").ttl(TtlClass::Short),
    );

    let warm_stats = stats.clone();
    core.warmer().register(InvalidationScope::User, "vocabulary-stats", move |id| {
        let stats = warm_stats.clone();
        async move { stats.call((id,)).await.map(|_| ()) }
    });

    let report = core.warm(InvalidationScope::User, "u1").await;
    assert_eq!(report.succeeded, vec!["vocabulary-stats"]);
    assert_eq!(store.len(), 1);

    stats.call(("u1".into(),)).await.unwrap();
    assert_eq!(calls.get(), 1);
}
