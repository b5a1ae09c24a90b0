//! Time/size-windowed batching of small calls into one bulk call.
//!
//! # Responsibilities
//! - Queue items and hand each caller its result by index
//! - Flush when the queue reaches `batch_size` or `batch_timeout` after the
//!   first queued item, whichever comes first
//!
//! # Design Decisions
//! - Flushing is a work loop that drains until the queue is empty
//! - Each drain takes items out of the queue before the bulk call, so no item
//!   is processed twice and new arrivals start a fresh window
//! - Every queued item receives exactly one outcome

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::BatchConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::observability::metrics;

type BulkFn<I, R> = Arc<dyn Fn(Vec<I>) -> BoxFuture<'static, ServiceResult<Vec<R>>> + Send + Sync>;

struct BatchItem<I, R> {
    item: I,
    reply: oneshot::Sender<ServiceResult<R>>,
}

struct QueueState<I, R> {
    items: Vec<BatchItem<I, R>>,
    timer_armed: bool,
    /// Bumped on every drain so stale timers exit without flushing.
    generation: u64,
}

impl<I, R> QueueState<I, R> {
    fn take(&mut self, max: usize) -> Vec<BatchItem<I, R>> {
        self.timer_armed = false;
        self.generation += 1;
        let n = self.items.len().min(max);
        self.items.drain(..n).collect()
    }
}

enum Action<I, R> {
    Flush(Vec<BatchItem<I, R>>),
    ArmTimer(u64),
    Wait,
}

struct Inner<I, R> {
    config: BatchConfig,
    processor: BulkFn<I, R>,
    queue: Mutex<QueueState<I, R>>,
}

impl<I, R> Inner<I, R>
where
    I: Send + 'static,
    R: Send + 'static,
{
    async fn run_timer(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.config.batch_timeout()).await;
        {
            let queue = self.queue.lock();
            if !queue.timer_armed || queue.generation != generation {
                return;
            }
        }
        self.drain().await;
    }

    async fn drain(&self) {
        loop {
            let batch = {
                let mut queue = self.queue.lock();
                if queue.items.is_empty() {
                    break;
                }
                queue.take(self.config.batch_size)
            };
            self.process(batch).await;
        }
    }

    async fn process(&self, batch: Vec<BatchItem<I, R>>) {
        let (items, replies): (Vec<I>, Vec<_>) =
            batch.into_iter().map(|b| (b.item, b.reply)).unzip();
        metrics::record_batch_size(items.len());

        match (self.processor)(items).await {
            Ok(results) => {
                let mut results = results.into_iter();
                for (index, reply) in replies.into_iter().enumerate() {
                    let outcome = results
                        .next()
                        .ok_or(ServiceError::MissingBatchResult { index });
                    let _ = reply.send(outcome);
                }
            }
            Err(e) => {
                tracing::warn!(size = replies.len(), error = %e, "Batch processing failed");
                for reply in replies {
                    let _ = reply.send(Err(e.clone()));
                }
            }
        }
    }
}

/// Batches `add` calls into bulk `processor` invocations.
pub struct BatchProcessor<I, R> {
    inner: Arc<Inner<I, R>>,
}

impl<I, R> BatchProcessor<I, R>
where
    I: Send + 'static,
    R: Send + 'static,
{
    /// `processor` receives the queued items and must answer index-aligned.
    pub fn new<F, Fut>(config: BatchConfig, processor: F) -> Self
    where
        F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<Vec<R>>> + Send + 'static,
    {
        let config = BatchConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                config,
                processor: Arc::new(move |items| processor(items).boxed()),
                queue: Mutex::new(QueueState {
                    items: Vec::new(),
                    timer_armed: false,
                    generation: 0,
                }),
            }),
        }
    }

    /// Queue `item` and wait for its result.
    pub async fn add(&self, item: I) -> ServiceResult<R> {
        let (reply, rx) = oneshot::channel();

        let action = {
            let mut queue = self.inner.queue.lock();
            queue.items.push(BatchItem { item, reply });
            if queue.items.len() >= self.inner.config.batch_size {
                Action::Flush(queue.take(self.inner.config.batch_size))
            } else if !queue.timer_armed {
                queue.timer_armed = true;
                Action::ArmTimer(queue.generation)
            } else {
                Action::Wait
            }
        };

        match action {
            Action::Flush(batch) => {
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.process(batch).await });
            }
            Action::ArmTimer(generation) => {
                tokio::spawn(self.inner.clone().run_timer(generation));
            }
            Action::Wait => {}
        }

        rx.await
            .unwrap_or_else(|_| Err(ServiceError::Batch("batch dropped before completion".into())))
    }

    /// Process everything queued right now. Used on shutdown.
    pub async fn flush(&self) {
        self.inner.drain().await;
    }

    /// Items waiting for a flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().items.len()
    }
}

impl<I, R> Clone for BatchProcessor<I, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
