//! Composition of the resilience and cache layers behind one handle.
//!
//! # Responsibilities
//! - Own the live configuration, the registry, the cache layer and the warmer
//! - Build wrapped functions: breaker → retry → dedup → cache
//! - Expose the operational entry points (invalidate, warm, stats, reset)
//! - Start and stop background tasks
//!
//! # Data Flow
//! ```text
//! ResilientFn::call(args)
//!     → Cached (hit returns here)
//!     → Deduplicated (join an identical in-flight call)
//!     → RetryExecutor::with_retry
//!         → CircuitBreaker::execute → producer(args)
//! ```
//!
//! # Design Decisions
//! - A hot reload affects breakers and wrappers created after it; handles
//!   already built keep the options they were built with
//! - Cache TTLs and store wiring are fixed at construction

use arc_swap::ArcSwap;
use futures_util::future::{BoxFuture, FutureExt};
use notify::RecommendedWatcher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{
    CacheLayer, CacheOptions, CacheWarmer, InvalidationReport, InvalidationScope, KeyValueStore, WarmReport,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::ConfigWatcher;
use crate::config::CoreConfig;
use crate::error::ServiceResult;
use crate::health::{CacheHealth, CacheHealthMonitor};
use crate::lifecycle::Shutdown;
use crate::resilience::{
    BatchProcessor, CircuitBreakerConfig, CircuitBreakerStats, DedupOptions, PendingRequestStats,
    ResilienceRegistry, RetryExecutor, RetryOptions,
};

type CallFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, ServiceResult<T>> + Send + Sync>;

/// Shared resilience and caching state of one process.
pub struct ResilienceCore {
    config: ArcSwap<CoreConfig>,
    registry: ResilienceRegistry,
    retry: RetryExecutor,
    cache: CacheLayer,
    warmer: CacheWarmer,
}

impl ResilienceCore {
    /// Build a core with its own registry. `config` is validated first.
    pub fn new(
        config: CoreConfig,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, Vec<ValidationError>> {
        let registry = ResilienceRegistry::new(CircuitBreakerConfig::from(&config.circuit_breaker));
        Self::with_registry(config, store, registry)
    }

    /// Build a core on top of an existing registry, e.g. [`ResilienceRegistry::global`].
    pub fn with_registry(
        config: CoreConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        registry: ResilienceRegistry,
    ) -> Result<Self, Vec<ValidationError>> {
        validate_config(&config)?;
        let cache = CacheLayer::new(store, &config.cache);
        Ok(Self {
            retry: RetryExecutor::new(registry.clone()),
            registry,
            cache,
            warmer: CacheWarmer::new(),
            config: ArcSwap::from_pointee(config),
        })
    }

    /// Connect to the configured redis store. The core still starts when the
    /// store is unreachable; caching is then skipped.
    #[cfg(feature = "redis")]
    pub async fn connect(config: CoreConfig) -> Result<Self, Vec<ValidationError>> {
        validate_config(&config)?;
        let store: Option<Arc<dyn KeyValueStore>> = if config.cache.store.enabled {
            match crate::cache::RedisStore::connect(&config.cache.store.url).await {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(url = %config.cache.store.url, error = %e, "Cache store unavailable, running without it");
                    None
                }
            }
        } else {
            None
        };
        Self::new(config, store)
    }

    /// Install logging and metrics from the current config.
    pub fn init_observability(&self) {
        crate::observability::init(&self.config.load().observability);
    }

    pub fn config(&self) -> Arc<CoreConfig> {
        self.config.load_full()
    }

    pub fn registry(&self) -> &ResilienceRegistry {
        &self.registry
    }

    pub fn retry_executor(&self) -> &RetryExecutor {
        &self.retry
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn warmer(&self) -> &CacheWarmer {
        &self.warmer
    }

    /// Start building a wrapped `f` whose breaker is named `service`.
    pub fn pipeline<A, T, F, Fut>(&self, service: impl Into<String>, f: F) -> PipelineBuilder<'_, A, T>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<T>> + Send + 'static,
    {
        let service = service.into();
        PipelineBuilder {
            core: self,
            namespace: service.clone(),
            service,
            func: Arc::new(move |args: A| f(args).boxed()),
            retry: Some(RetryOptions::from_config(&self.config.load().retry)),
            dedup: None,
            cache: None,
        }
    }

    /// Batch processor using the configured size and timeout.
    pub fn batch_processor<I, R, F, Fut>(&self, processor: F) -> BatchProcessor<I, R>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<Vec<R>>> + Send + 'static,
    {
        BatchProcessor::new(self.config.load().batch, processor)
    }

    pub async fn invalidate(&self, scope: InvalidationScope, id: &str) -> InvalidationReport {
        self.cache.invalidate(scope, id).await
    }

    pub async fn warm(&self, scope: InvalidationScope, id: &str) -> WarmReport {
        self.warmer.warm(scope, id).await
    }

    pub async fn cache_health(&self) -> CacheHealth {
        self.cache.health().await
    }

    pub fn circuit_breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        self.registry.circuit_breaker_stats()
    }

    pub fn reset_circuit_breaker(&self, name: &str) -> bool {
        let reset = self.registry.reset_circuit_breaker(name);
        if reset {
            tracing::info!(service = %name, "Circuit breaker reset by operator");
        }
        reset
    }

    pub fn pending_request_stats(&self) -> PendingRequestStats {
        self.registry.pending_request_stats()
    }

    /// Validate and swap in `config`.
    pub fn apply_config(&self, config: CoreConfig) -> Result<(), Vec<ValidationError>> {
        validate_config(&config)?;
        self.registry
            .set_breaker_defaults(CircuitBreakerConfig::from(&config.circuit_breaker));
        self.config.store(Arc::new(config));
        tracing::info!("Configuration applied");
        Ok(())
    }

    /// Apply configs from a [`ConfigWatcher`] channel until it closes or shutdown is triggered.
    pub fn watch_config(
        self: Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<CoreConfig>,
        shutdown: &Shutdown,
    ) -> JoinHandle<()> {
        let core = self;
        let stop = shutdown.clone();
        let mut shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if stop.is_triggered() {
                return;
            }
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => {
                            if let Err(errors) = core.apply_config(config) {
                                for error in &errors {
                                    tracing::error!(field = error.field, message = %error.message, "Rejected config reload");
                                }
                            }
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    /// Watch `path` and apply every valid change. Keep the returned watcher alive.
    pub fn watch_config_file(
        self: Arc<Self>,
        path: &Path,
        shutdown: &Shutdown,
    ) -> Result<(RecommendedWatcher, JoinHandle<()>), notify::Error> {
        let (watcher, updates) = ConfigWatcher::new(path);
        let watcher = watcher.run()?;
        Ok((watcher, self.watch_config(updates, shutdown)))
    }

    /// Start the pending-request sweeper and the cache health monitor.
    /// Nothing is started once `shutdown` has been triggered.
    pub fn spawn_background_tasks(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let receivers = (shutdown.subscribe_active(), shutdown.subscribe_active());
        let (Some(sweeper_rx), Some(health_rx)) = receivers else {
            tracing::warn!("Shutdown already triggered, background tasks not started");
            return Vec::new();
        };
        let config = self.config.load();
        let sweeper = self.registry.deduplicator().spawn_sweeper(
            Duration::from_secs(config.dedup.sweep_interval_secs),
            Duration::from_secs(config.dedup.sweep_max_age_secs),
            sweeper_rx,
        );
        let monitor = CacheHealthMonitor::new(
            self.cache.clone(),
            Duration::from_secs(config.cache.health_check_interval_secs),
        );
        let health = tokio::spawn(monitor.run(health_rx));
        tracing::info!("Background tasks started");
        vec![sweeper, health]
    }
}

/// Builder returned by [`ResilienceCore::pipeline`].
pub struct PipelineBuilder<'a, A, T> {
    core: &'a ResilienceCore,
    service: String,
    namespace: String,
    func: CallFn<A, T>,
    retry: Option<RetryOptions>,
    dedup: Option<DedupOptions<A>>,
    cache: Option<CacheOptions>,
}

impl<'a, A, T> PipelineBuilder<'a, A, T>
where
    A: Clone + Serialize + Send + Sync + 'static,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Replace the configured retry policy.
    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = Some(options);
        self
    }

    /// Single attempt, still guarded by the breaker.
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    pub fn dedup(mut self, options: DedupOptions<A>) -> Self {
        self.dedup = Some(options);
        self
    }

    /// Deduplicate with the configured window and joiner limit.
    pub fn dedup_default(self) -> Self {
        let options = DedupOptions::from_config(&self.core.config.load().dedup);
        self.dedup(options)
    }

    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }

    /// Prefix of deduplication keys; defaults to the service name.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn build(self) -> ResilientFn<A, T> {
        let service: Arc<str> = self.service.into();
        let options = Arc::new(self.retry.unwrap_or(RetryOptions {
            max_attempts: 1,
            ..RetryOptions::default()
        }));

        let executor = self.core.retry.clone();
        let producer = self.func;
        let breaker_service = service.clone();
        let mut stage: CallFn<A, T> = Arc::new(move |args: A| {
            let executor = executor.clone();
            let options = options.clone();
            let producer = producer.clone();
            let service = breaker_service.clone();
            async move {
                executor
                    .with_retry(&service, &options, || producer(args.clone()))
                    .await
            }
            .boxed()
        });

        if let Some(options) = self.dedup {
            let inner = stage.clone();
            let deduplicated = self.core.registry.deduplicator().wrap(
                self.namespace,
                move |args: A| inner(args),
                options,
            );
            stage = Arc::new(move |args: A| {
                let deduplicated = deduplicated.clone();
                async move { deduplicated.call(args).await }.boxed()
            });
        }

        if let Some(options) = self.cache {
            let inner = stage.clone();
            let cached = self.core.cache.cached(move |args: A| inner(args), options);
            stage = Arc::new(move |args: A| {
                let cached = cached.clone();
                async move { cached.call(args).await }.boxed()
            });
        }

        ResilientFn { service, func: stage }
    }
}

/// A function wrapped by [`PipelineBuilder::build`]; same inputs and outputs
/// as the producer.
pub struct ResilientFn<A, T> {
    service: Arc<str>,
    func: CallFn<A, T>,
}

impl<A, T> ResilientFn<A, T> {
    pub async fn call(&self, args: A) -> ServiceResult<T> {
        (self.func)(args).await
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl<A, T> Clone for ResilientFn<A, T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            func: self.func.clone(),
        }
    }
}
