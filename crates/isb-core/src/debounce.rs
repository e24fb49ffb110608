//! Debounced, per-key batch notifier
//!
//! Values added for the same key accumulate until the worker picks that key
//! up; the worker then hands the whole batch to the flush callback. One
//! worker task per notifier, so at most one flush is in flight across all
//! keys. Keys are served in the order their pending batch was opened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Flush callback: receives a key and every value batched for it.
pub type FlushFn<K, V> = Arc<dyn Fn(K, Vec<V>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Pending<K, V> {
    batches: VecDeque<(K, Vec<V>)>,
}

impl<K: PartialEq, V> Pending<K, V> {
    fn push(&mut self, key: K, value: V) {
        match self.batches.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.batches.push_back((key, vec![value])),
        }
    }
}

/// Coalesces rapid updates per key and serializes their delivery.
pub struct Debouncer<K, V> {
    pending: Arc<Mutex<Pending<K, V>>>,
    wake: Arc<Notify>,
    worker: JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: PartialEq + Send + 'static,
    V: Send + 'static,
{
    /// Spawn the worker. `cooldown` is slept after every flush before the
    /// next batch is picked up.
    pub fn new<F>(cooldown: Duration, flush: F) -> Self
    where
        F: Fn(K, Vec<V>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending {
            batches: VecDeque::new(),
        }));
        let wake = Arc::new(Notify::new());
        let flush: FlushFn<K, V> = Arc::new(flush);

        let worker = tokio::spawn(run_worker(pending.clone(), wake.clone(), flush, cooldown));

        Self {
            pending,
            wake,
            worker,
        }
    }

    /// Queue `value` under `key` and make sure the worker will look at it.
    pub fn add(&self, key: K, value: V) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push(key, value),
            Err(poisoned) => poisoned.into_inner().push(key, value),
        }
        self.wake.notify_one();
    }

    /// Number of keys with a batch waiting to be flushed
    pub fn pending_keys(&self) -> usize {
        match self.pending.lock() {
            Ok(pending) => pending.batches.len(),
            Err(poisoned) => poisoned.into_inner().batches.len(),
        }
    }
}

impl<K, V> Drop for Debouncer<K, V> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker<K, V>(
    pending: Arc<Mutex<Pending<K, V>>>,
    wake: Arc<Notify>,
    flush: FlushFn<K, V>,
    cooldown: Duration,
) {
    loop {
        wake.notified().await;

        loop {
            let next = match pending.lock() {
                Ok(mut p) => p.batches.pop_front(),
                Err(poisoned) => poisoned.into_inner().batches.pop_front(),
            };
            let Some((key, values)) = next else {
                break;
            };

            debug!(batch = values.len(), "flushing debounced batch");
            if let Err(e) = flush(key, values).await {
                error!("debounced flush failed: {:#}", e);
            }

            if !cooldown.is_zero() {
                tokio::time::sleep(cooldown).await;
            }
        }
    }
}
