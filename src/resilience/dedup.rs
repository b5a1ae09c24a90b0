//! In-flight request deduplication.
//!
//! # Responsibilities
//! - Coalesce concurrent calls sharing a derived key into one execution
//! - Bound joiners per execution (`max_concurrent`) and entry age (`ttl`)
//! - Sweep entries left behind by executions nobody polls any more
//!
//! # Design Decisions
//! - One registry serves every wrapped function; entries are type-erased and
//!   keys are namespaced per wrapped function
//! - The execution removes its own entry (matched by id) before joiners
//!   observe the result, so a settled key is re-executed on the next call
//! - The wrapped function is invoked lazily, outside the map's shard lock
//! - Key derivation is pluggable; the default serializes the arguments with
//!   serde_json, which is only stable for primitive, tuple and sequence
//!   arguments (map-like arguments should supply a key generator)

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::DedupConfig;
use crate::error::ServiceResult;
use crate::observability::metrics;

/// Maximum characters of source text used in translation keys.
pub const TRANSLATION_KEY_CHARS: usize = 100;

/// Shortest sweep period the background sweeper accepts.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;
type SharedCall<T> = Shared<BoxFuture<'static, ServiceResult<T>>>;
type CallFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, ServiceResult<T>> + Send + Sync>;

static UNKEYABLE: AtomicU64 = AtomicU64::new(0);

fn json_key<A: Serialize>(args: &A) -> String {
    match serde_json::to_string(args) {
        Ok(key) => key,
        Err(e) => {
            // Never coalesce calls whose arguments cannot be keyed.
            tracing::warn!(error = %e, "Arguments not serializable, skipping deduplication");
            format!("unkeyable#{}", UNKEYABLE.fetch_add(1, Ordering::Relaxed))
        }
    }
}

/// Key used by translation calls: mode plus the first 100 characters of text.
pub fn translation_key(text: &str, mode: &str) -> String {
    let truncated: String = text.chars().take(TRANSLATION_KEY_CHARS).collect();
    format!("{}:{}", mode, truncated)
}

/// Deduplication options for a wrapped function taking `A`.
pub struct DedupOptions<A> {
    /// Age after which an in-flight entry is no longer joined.
    pub ttl: Duration,
    /// Callers allowed to share one execution.
    pub max_concurrent: usize,
    key_generator: KeyFn<A>,
}

impl<A> DedupOptions<A> {
    /// Options with a custom key generator and default limits.
    pub fn with_key_generator(key_generator: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_concurrent: 10,
            key_generator: Arc::new(key_generator),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn key_for(&self, args: &A) -> String {
        (self.key_generator)(args)
    }
}

impl<A: Serialize + 'static> DedupOptions<A> {
    /// External API calls: 10s window, 5 joiners.
    pub fn api() -> Self {
        Self::default().ttl(Duration::from_secs(10)).max_concurrent(5)
    }

    /// Database queries: 5s window, 3 joiners.
    pub fn database() -> Self {
        Self::default().ttl(Duration::from_secs(5)).max_concurrent(3)
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::default()
            .ttl(Duration::from_secs(config.ttl_secs))
            .max_concurrent(config.max_concurrent)
    }
}

impl DedupOptions<(String, String)> {
    /// Translation calls keyed on `(text, mode)`: 60s window, 2 joiners.
    pub fn translation() -> Self {
        Self::with_key_generator(|(text, mode): &(String, String)| translation_key(text, mode))
            .ttl(Duration::from_secs(60))
            .max_concurrent(2)
    }
}

impl<A: Serialize + 'static> Default for DedupOptions<A> {
    fn default() -> Self {
        Self::with_key_generator(json_key::<A>)
    }
}

impl<A> Clone for DedupOptions<A> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            max_concurrent: self.max_concurrent,
            key_generator: self.key_generator.clone(),
        }
    }
}

impl<A> fmt::Debug for DedupOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupOptions")
            .field("ttl", &self.ttl)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

/// One in-flight execution.
struct PendingEntry {
    id: u64,
    created: Instant,
    request_count: Arc<AtomicUsize>,
    shared: Arc<dyn Any + Send + Sync>,
}

/// Decrements the joiner count when a caller finishes or is dropped.
struct CallerGuard(Arc<AtomicUsize>);

impl Drop for CallerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A single pending entry as reported by [`RequestDeduplicator::stats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingRequestInfo {
    pub key: String,
    pub age_ms: u64,
    pub request_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct PendingRequestStats {
    pub total: usize,
    pub entries: Vec<PendingRequestInfo>,
}

/// Registry of in-flight executions keyed by deduplication key.
#[derive(Clone, Default)]
pub struct RequestDeduplicator {
    pending: Arc<DashMap<String, PendingEntry>>,
    next_id: Arc<AtomicU64>,
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `f` so concurrent calls with equal keys share one execution.
    ///
    /// `namespace` stands in for the function's identity and prefixes every key.
    pub fn wrap<A, T, F, Fut>(
        &self,
        namespace: impl Into<String>,
        f: F,
        options: DedupOptions<A>,
    ) -> Deduplicated<A, T>
    where
        A: Send + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<T>> + Send + 'static,
    {
        Deduplicated {
            namespace: namespace.into().into(),
            options,
            func: Arc::new(move |args: A| f(args).boxed()),
            dedup: self.clone(),
        }
    }

    /// Run `make` unless a live execution for `key` can be joined.
    pub async fn execute<T, M>(
        &self,
        namespace: &str,
        key: String,
        ttl: Duration,
        max_concurrent: usize,
        make: M,
    ) -> ServiceResult<T>
    where
        T: Clone + Send + Sync + 'static,
        M: FnOnce() -> BoxFuture<'static, ServiceResult<T>> + Send + 'static,
    {
        let (shared, counter, joined) = match self.pending.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let joinable = {
                    let entry = occupied.get();
                    let live = entry.created.elapsed() < ttl
                        && entry.request_count.load(Ordering::SeqCst) < max_concurrent;
                    if live {
                        entry.shared.downcast_ref::<SharedCall<T>>().map(|shared| {
                            entry.request_count.fetch_add(1, Ordering::SeqCst);
                            (shared.clone(), entry.request_count.clone())
                        })
                    } else {
                        None
                    }
                };

                match joinable {
                    Some((shared, counter)) => (shared, counter, true),
                    None => {
                        let (entry, shared, counter) = self.new_entry(key.clone(), make);
                        occupied.insert(entry);
                        (shared, counter, false)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (entry, shared, counter) = self.new_entry(key.clone(), make);
                vacant.insert(entry);
                (shared, counter, false)
            }
        };

        if joined {
            tracing::debug!(key = %key, "Joined in-flight request");
            metrics::record_dedup_join(namespace);
        } else {
            metrics::record_dedup_pending(self.pending.len());
        }

        let _guard = CallerGuard(counter);
        shared.await
    }

    fn new_entry<T, M>(&self, key: String, make: M) -> (PendingEntry, SharedCall<T>, Arc<AtomicUsize>)
    where
        T: Clone + Send + Sync + 'static,
        M: FnOnce() -> BoxFuture<'static, ServiceResult<T>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.clone();

        let shared: SharedCall<T> = async move {
            let result = make().await;
            pending.remove_if(&key, |_, entry| entry.id == id);
            result
        }
        .boxed()
        .shared();

        let counter = Arc::new(AtomicUsize::new(1));
        let entry = PendingEntry {
            id,
            created: Instant::now(),
            request_count: counter.clone(),
            shared: Arc::new(shared.clone()),
        };
        (entry, shared, counter)
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove entries older than `max_age`, settled or not.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        self.pending.retain(|_, entry| {
            let keep = entry.created.elapsed() <= max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!(removed, "Swept expired pending requests");
            metrics::record_dedup_pending(self.pending.len());
        }
        removed
    }

    /// Sweep every `interval` until shutdown. A zero interval is raised to
    /// [`MIN_SWEEP_INTERVAL`].
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        max_age: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let dedup = self.clone();
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        dedup.sweep_expired(max_age);
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Pending request sweeper stopping");
                        break;
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> PendingRequestStats {
        let mut entries: Vec<_> = self
            .pending
            .iter()
            .map(|r| PendingRequestInfo {
                key: r.key().clone(),
                age_ms: r.value().created.elapsed().as_millis() as u64,
                request_count: r.value().request_count.load(Ordering::SeqCst),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        PendingRequestStats {
            total: entries.len(),
            entries,
        }
    }
}

impl fmt::Debug for RequestDeduplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// A function wrapped by [`RequestDeduplicator::wrap`].
pub struct Deduplicated<A, T> {
    namespace: Arc<str>,
    options: DedupOptions<A>,
    func: CallFn<A, T>,
    dedup: RequestDeduplicator,
}

impl<A, T> Deduplicated<A, T>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub async fn call(&self, args: A) -> ServiceResult<T> {
        let key = format!("{}:{}", self.namespace, self.options.key_for(&args));
        let func = self.func.clone();
        self.dedup
            .execute(
                &self.namespace,
                key,
                self.options.ttl,
                self.options.max_concurrent,
                move || func(args),
            )
            .await
    }
}

impl<A, T> Clone for Deduplicated<A, T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            options: self.options.clone(),
            func: self.func.clone(),
            dedup: self.dedup.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use futures_util::future::join_all;

    fn counting(
        dedup: &RequestDeduplicator,
        options: DedupOptions<(String,)>,
        delay: Duration,
    ) -> (Deduplicated<(String,), usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let wrapped = dedup.wrap(
            "fetch",
            move |(id,): (String,)| {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(delay).await;
                    if id == "bad" {
                        Err(ServiceError::other("producer failed"))
                    } else {
                        Ok(n)
                    }
                }
            },
            options,
        );
        (wrapped, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_coalesce() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, calls) = counting(&dedup, DedupOptions::default(), Duration::from_millis(50));

        let results = join_all((0..10).map(|_| wrapped.call(("u1".to_string(),)))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Ok(1)));
        assert!(dedup.is_empty(), "settled entry must be removed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_shared_by_all_joiners() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, calls) = counting(&dedup, DedupOptions::default(), Duration::from_millis(50));

        let results = join_all((0..5).map(|_| wrapped.call(("bad".to_string(),)))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| *r == Err(ServiceError::other("producer failed"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_separately() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, calls) = counting(&dedup, DedupOptions::default(), Duration::from_millis(50));

        let (a, b) = tokio::join!(
            wrapped.call(("u1".to_string(),)),
            wrapped.call(("u2".to_string(),))
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_concurrent_overflow_starts_new_execution() {
        let dedup = RequestDeduplicator::new();
        let options = DedupOptions::default().max_concurrent(3);
        let (wrapped, calls) = counting(&dedup, options, Duration::from_millis(50));

        let results = join_all((0..4).map(|_| wrapped.call(("u1".to_string(),)))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(results.iter().filter(|r| **r == Ok(1)).count(), 3);
        assert_eq!(results.iter().filter(|r| **r == Ok(2)).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_not_joined() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, calls) = counting(&dedup, DedupOptions::default(), Duration::from_secs(60));

        let first = {
            let wrapped = wrapped.clone();
            tokio::spawn(async move { wrapped.call(("u1".to_string(),)).await })
        };
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = wrapped.call(("u1".to_string(),)).await;
        assert_eq!(second, Ok(2));
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_key_runs_again() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, calls) = counting(&dedup, DedupOptions::default(), Duration::from_millis(10));

        assert_eq!(wrapped.call(("u1".to_string(),)).await, Ok(1));
        assert_eq!(wrapped.call(("u1".to_string(),)).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_abandoned_entries() {
        let dedup = RequestDeduplicator::new();
        let (wrapped, _calls) = counting(&dedup, DedupOptions::default(), Duration::from_secs(600));

        let handle = {
            let wrapped = wrapped.clone();
            tokio::spawn(async move { wrapped.call(("u1".to_string(),)).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(dedup.len(), 1);

        let stats = dedup.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.entries[0].key, r#"fetch:["u1"]"#);
        assert_eq!(stats.entries[0].request_count, 1);

        assert_eq!(dedup.sweep_expired(Duration::from_secs(30)), 0);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(dedup.sweep_expired(Duration::from_secs(30)), 1);
        assert!(dedup.is_empty());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_stops_on_shutdown() {
        let dedup = RequestDeduplicator::new();
        let (tx, rx) = broadcast::channel(1);
        let handle = dedup.spawn_sweeper(Duration::from_secs(60), Duration::from_secs(30), rx);

        tokio::time::sleep(Duration::from_secs(120)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sweep_interval_is_clamped() {
        let dedup = RequestDeduplicator::new();
        let (tx, rx) = broadcast::channel(1);
        let handle = dedup.spawn_sweeper(Duration::ZERO, Duration::from_secs(30), rx);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_translation_key_truncates() {
        let long = "a".repeat(250);
        let key = translation_key(&long, "formal");
        assert_eq!(key, format!("formal:{}", "a".repeat(100)));

        let options = DedupOptions::translation();
        assert_eq!(options.ttl, Duration::from_secs(60));
        assert_eq!(options.max_concurrent, 2);
        assert_eq!(
            options.key_for(&("héllo".to_string(), "casual".to_string())),
            "casual:héllo"
        );
    }

    #[test]
    fn test_presets() {
        let api = DedupOptions::<(u32,)>::api();
        assert_eq!((api.ttl, api.max_concurrent), (Duration::from_secs(10), 5));
        let db = DedupOptions::<(u32,)>::database();
        assert_eq!((db.ttl, db.max_concurrent), (Duration::from_secs(5), 3));
        assert_eq!(db.key_for(&(7,)), "[7]");
    }
}
