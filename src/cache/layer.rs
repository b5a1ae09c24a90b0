//! Multi-tier cached functions.
//!
//! # Data Flow
//! ```text
//! Cached::call(args)
//!     → key = "{prefix}:{json(args)}"
//!     → local layer hit?  → deserialize, return
//!     → store GET hit?    → deserialize, fill local layer, return
//!     → producer(args)    → serialize once → SETEX store, fill local layer
//! ```
//!
//! # Design Decisions
//! - Store and serde failures are logged, counted and treated as a miss or a
//!   skipped write; only producer errors reach the caller
//! - The local layer keeps its own TTL, shorter than the store's

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::cache::key::cache_key;
use crate::cache::local::LocalCache;
use crate::cache::store::KeyValueStore;
use crate::config::{CacheConfig, TtlConfig};
use crate::error::ServiceResult;
use crate::observability::metrics;

type CallFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, ServiceResult<T>> + Send + Sync>;

/// Derives per-call tags from the JSON form of the arguments.
pub type TagFn = Arc<dyn Fn(&serde_json::Value) -> Vec<String> + Send + Sync>;

/// Named TTL classes, resolved against [`TtlConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlClass {
    /// Volatile aggregates such as stats.
    Short,
    /// Lists.
    #[default]
    Medium,
    Long,
    Translation,
    /// Explicit seconds.
    Custom(u64),
}

impl TtlClass {
    pub fn secs(&self, config: &TtlConfig) -> u64 {
        match self {
            TtlClass::Short => config.short,
            TtlClass::Medium => config.medium,
            TtlClass::Long => config.long,
            TtlClass::Translation => config.translation,
            TtlClass::Custom(secs) => *secs,
        }
    }
}

/// Options of a cached function.
#[derive(Clone)]
pub struct CacheOptions {
    pub key_prefix: String,
    pub ttl: TtlClass,
    /// Local-layer tags shared by every entry of the wrapper.
    pub tags: Vec<String>,
    /// Local-layer tags computed per call, e.g. `vocabulary-{user_id}`.
    pub tag_fn: Option<TagFn>,
    pub use_external_store: bool,
    pub use_local_layer: bool,
}

impl CacheOptions {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl: TtlClass::default(),
            tags: Vec::new(),
            tag_fn: None,
            use_external_store: true,
            use_local_layer: true,
        }
    }

    pub fn ttl(mut self, ttl: TtlClass) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tag_with(mut self, f: impl Fn(&serde_json::Value) -> Vec<String> + Send + Sync + 'static) -> Self {
        self.tag_fn = Some(Arc::new(f));
        self
    }

    /// Tag each entry `{prefix}-{id}`, where `id` is the first argument when
    /// it is a string.
    pub fn tag_by_first_arg(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.tag_with(move |args| {
            args.get(0)
                .and_then(|first| first.as_str())
                .map(|id| vec![format!("{}-{}", prefix, id)])
                .unwrap_or_default()
        })
    }

    /// Static tags plus those derived from `args`.
    fn tags_for<A: Serialize>(&self, args: &A) -> Vec<String> {
        let mut tags = self.tags.clone();
        if let Some(tag_fn) = &self.tag_fn {
            match serde_json::to_value(args) {
                Ok(value) => tags.extend(tag_fn(&value)),
                Err(e) => tracing::warn!(prefix = %self.key_prefix, error = %e, "Arguments not taggable"),
            }
        }
        tags
    }

    pub fn external_store(mut self, enabled: bool) -> Self {
        self.use_external_store = enabled;
        self
    }

    pub fn local_layer(mut self, enabled: bool) -> Self {
        self.use_local_layer = enabled;
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .field("tags", &self.tags)
            .field("tag_fn", &self.tag_fn.is_some())
            .field("use_external_store", &self.use_external_store)
            .field("use_local_layer", &self.use_local_layer)
            .finish()
    }
}

struct LayerInner {
    store: Option<Arc<dyn KeyValueStore>>,
    local: Option<LocalCache>,
    ttl: TtlConfig,
}

/// External store plus optional local layer.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<LayerInner>,
}

impl CacheLayer {
    /// `store` is ignored when the config disables the external store.
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, config: &CacheConfig) -> Self {
        let store = store.filter(|_| config.store.enabled);
        let local = config.local.enabled.then(|| LocalCache::from_config(&config.local));
        tracing::debug!(
            store = store.is_some(),
            local = local.is_some(),
            "Cache layer configured"
        );
        Self {
            inner: Arc::new(LayerInner {
                store,
                local,
                ttl: config.ttl.clone(),
            }),
        }
    }

    /// A layer that caches nothing.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(LayerInner {
                store: None,
                local: None,
                ttl: TtlConfig::default(),
            }),
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn KeyValueStore>> {
        self.inner.store.as_ref()
    }

    pub fn local(&self) -> Option<&LocalCache> {
        self.inner.local.as_ref()
    }

    pub fn ttl_secs(&self, ttl: TtlClass) -> u64 {
        ttl.secs(&self.inner.ttl)
    }

    /// Look `key` up in both layers.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key, true, true, &[]).await
    }

    /// Write `value` to both layers.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: TtlClass, tags: &[String]) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write(key, raw, ttl, tags, true, true).await,
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache value not serializable"),
        }
    }

    /// Remove `key` from both layers.
    pub async fn delete(&self, key: &str) {
        if let Some(local) = self.local() {
            local.remove(key);
        }
        if let Some(store) = self.store() {
            if let Err(e) = store.del(key).await {
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
                metrics::record_cache_backend_error("del");
            }
        }
    }

    /// Wrap `f` so results are served from cache when possible.
    pub fn cached<A, T, F, Fut>(&self, f: F, options: CacheOptions) -> Cached<A, T>
    where
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<T>> + Send + 'static,
    {
        Cached {
            layer: self.clone(),
            options,
            func: Arc::new(move |args: A| f(args).boxed()),
        }
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        key: &str,
        use_store: bool,
        use_local: bool,
        tags: &[String],
    ) -> Option<T> {
        let local = self.local().filter(|_| use_local);

        if let Some(local) = local {
            let hit = local.get(key);
            metrics::record_cache_request("local", hit.is_some());
            if let Some(raw) = hit {
                match serde_json::from_str(&raw) {
                    Ok(value) => {
                        tracing::debug!(key = %key, layer = "local", "Cache hit");
                        return Some(value);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Discarding undecodable local entry");
                        local.remove(key);
                    }
                }
            }
        }

        let store = self.store().filter(|_| use_store)?;
        let raw = match store.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_backend_error("get");
                return None;
            }
        };
        metrics::record_cache_request("store", raw.is_some());

        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key = %key, layer = "store", "Cache hit");
                if let Some(local) = local {
                    local.insert(key, raw, tags);
                }
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                metrics::record_cache_backend_error("decode");
                None
            }
        }
    }

    async fn write(
        &self,
        key: &str,
        raw: String,
        ttl: TtlClass,
        tags: &[String],
        use_store: bool,
        use_local: bool,
    ) {
        if let Some(store) = self.store().filter(|_| use_store) {
            let ttl_secs = self.ttl_secs(ttl);
            match store.set_ex(key, ttl_secs, &raw).await {
                Ok(()) => tracing::debug!(key = %key, ttl_secs, "Cache set"),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache write failed, skipping");
                    metrics::record_cache_backend_error("set");
                }
            }
        }
        if let Some(local) = self.local().filter(|_| use_local) {
            local.insert(key, raw, tags);
        }
    }
}

impl fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("store", &self.inner.store.is_some())
            .field("local", &self.inner.local)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

/// A function wrapped by [`CacheLayer::cached`].
pub struct Cached<A, T> {
    layer: CacheLayer,
    options: CacheOptions,
    func: CallFn<A, T>,
}

impl<A, T> Cached<A, T>
where
    A: Serialize + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub async fn call(&self, args: A) -> ServiceResult<T> {
        let opts = &self.options;
        let key = match cache_key(&opts.key_prefix, &args) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(prefix = %opts.key_prefix, error = %e, "Arguments not keyable, bypassing cache");
                return (self.func)(args).await;
            }
        };

        let tags = opts.tags_for(&args);
        if let Some(value) = self
            .layer
            .lookup(&key, opts.use_external_store, opts.use_local_layer, &tags)
            .await
        {
            return Ok(value);
        }

        let value = (self.func)(args).await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                self.layer
                    .write(
                        &key,
                        raw,
                        opts.ttl,
                        &tags,
                        opts.use_external_store,
                        opts.use_local_layer,
                    )
                    .await
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Result not serializable, not cached"),
        }
        Ok(value)
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }
}

impl<A, T> Clone for Cached<A, T> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer.clone(),
            options: self.options.clone(),
            func: self.func.clone(),
        }
    }
}
