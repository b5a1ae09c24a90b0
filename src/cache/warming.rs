//! Cache warming.
//!
//! Read paths register under a scope; `warm(scope, id)` runs them all
//! concurrently so their results are cached before the first real request
//! (for example right after a login). Failures are logged and reported,
//! never returned as errors.

use futures_util::future::{join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::cache::invalidation::InvalidationScope;
use crate::error::ServiceResult;

type WarmFn = Arc<dyn Fn(String) -> BoxFuture<'static, ServiceResult<()>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmFailure {
    pub task: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<WarmFailure>,
}

#[derive(Clone, Default)]
pub struct CacheWarmer {
    tasks: Arc<RwLock<HashMap<InvalidationScope, Vec<(String, WarmFn)>>>>,
}

impl CacheWarmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` to run whenever `scope` is warmed. It receives the id.
    pub fn register<F, Fut>(&self, scope: InvalidationScope, name: impl Into<String>, task: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<()>> + Send + 'static,
    {
        let task: WarmFn = Arc::new(move |id| task(id).boxed());
        self.tasks
            .write()
            .entry(scope)
            .or_default()
            .push((name.into(), task));
    }

    pub fn task_count(&self, scope: InvalidationScope) -> usize {
        self.tasks.read().get(&scope).map_or(0, Vec::len)
    }

    pub async fn warm(&self, scope: InvalidationScope, id: &str) -> WarmReport {
        let tasks = self.tasks.read().get(&scope).cloned().unwrap_or_default();
        if tasks.is_empty() {
            tracing::debug!(scope = %scope, "No warming tasks registered");
            return WarmReport::default();
        }

        let runs = tasks.into_iter().map(|(name, task)| {
            let id = id.to_string();
            async move { (name, task(id).await) }
        });

        let mut report = WarmReport::default();
        for (name, outcome) in join_all(runs).await {
            match outcome {
                Ok(()) => report.succeeded.push(name),
                Err(e) => {
                    tracing::warn!(scope = %scope, task = %name, error = %e, "Cache warming task failed");
                    report.failed.push(WarmFailure {
                        task: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            scope = %scope,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Cache warmed"
        );
        report
    }
}
