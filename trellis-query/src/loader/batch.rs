//! Per-request batching and memoization.
//!
//! A [`BatchedLoader`] collects every key requested while the current task
//! runs. The first waiter polled after the task has yielded
//! `batch_delay_ticks` times takes the pending keys and issues one bulk fetch
//! for them, inside the task that awaits the loads. A batch never closes
//! while that task is still enqueuing, on any runtime flavor.
//!
//! Each key maps to one shared future, so concurrent and later requests for
//! the same key observe the same outcome, success or failure.
//!
//! ```rust,no_run
//! use trellis_query::loader::{BatchedLoader, batch_fn};
//! use trellis_query::error::QueryResult;
//! use trellis_schema::LoaderConfig;
//!
//! # async fn demo() -> QueryResult<()> {
//! let squares = BatchedLoader::new(
//!     "squares",
//!     batch_fn(|keys: Vec<u64>| async move {
//!         Ok(keys.into_iter().map(|k| Some(k * k)).collect())
//!     }),
//!     &LoaderConfig::default(),
//! );
//!
//! let (a, b) = futures::join!(squares.load(3), squares.load(4));
//! assert_eq!((a?, b?), (Some(9), Some(16)));
//! assert_eq!(squares.stats().batches, 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{self, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use trellis_schema::LoaderConfig;

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::traits::BoxFuture;

/// Bulk fetch behind a loader.
///
/// Must return exactly one entry per key, in key order, with `None` for keys
/// that have no value. A length mismatch rejects the whole batch.
pub trait BatchFn<K, V>: Send + Sync + 'static {
    /// Fetch values for distinct keys.
    fn fetch_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, QueryResult<Vec<Option<V>>>>;
}

/// Adapter turning an async closure into a [`BatchFn`].
pub struct FnBatch<F, K, V> {
    f: F,
    _marker: PhantomData<fn(Vec<K>) -> V>,
}

/// Wrap an async closure over owned keys as a [`BatchFn`].
pub fn batch_fn<F, Fut, K, V>(f: F) -> FnBatch<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueryResult<Vec<Option<V>>>> + Send + 'static,
{
    FnBatch {
        f,
        _marker: PhantomData,
    }
}

impl<F, Fut, K, V> BatchFn<K, V> for FnBatch<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueryResult<Vec<Option<V>>>> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn fetch_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, QueryResult<Vec<Option<V>>>> {
        Box::pin((self.f)(keys.to_vec()))
    }
}

/// Counters for one loader instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Calls to `load`, including those made by `load_many`.
    pub loads: u64,
    /// Loads answered by an existing future.
    pub cache_hits: u64,
    /// Keys seeded through `prime`.
    pub primed: u64,
    /// Bulk fetches issued.
    pub batches: u64,
    /// Keys passed to bulk fetches.
    pub keys_fetched: u64,
    /// Bulk fetches that failed or were misaligned.
    pub failed_batches: u64,
}

#[derive(Default)]
struct Counters {
    loads: AtomicU64,
    cache_hits: AtomicU64,
    primed: AtomicU64,
    batches: AtomicU64,
    keys_fetched: AtomicU64,
    failed_batches: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoaderStats {
        LoaderStats {
            loads: self.loads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            primed: self.primed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            keys_fetched: self.keys_fetched.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }
}

type Slot<V> = Shared<BoxFuture<'static, QueryResult<Option<V>>>>;

struct Pending<K, V> {
    key: K,
    tx: oneshot::Sender<QueryResult<Option<V>>>,
}

struct State<K, V> {
    slots: HashMap<K, Slot<V>>,
    /// Distinct keys in order of first request.
    pending: Vec<Pending<K, V>>,
    /// Bumped every time `pending` is taken.
    epoch: u64,
}

struct Inner<K, V> {
    name: &'static str,
    fetcher: Arc<dyn BatchFn<K, V>>,
    max_batch_size: usize,
    batch_delay_ticks: usize,
    cache: bool,
    log_batches: bool,
    state: Mutex<State<K, V>>,
    counters: Counters,
}

/// A batching, memoizing loader scoped to one request.
///
/// Cloning is cheap and clones share state.
pub struct BatchedLoader<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for BatchedLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for BatchedLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchedLoader")
            .field("name", &self.inner.name)
            .field("max_batch_size", &self.inner.max_batch_size)
            .field("cache", &self.inner.cache)
            .field("stats", &self.inner.counters.snapshot())
            .finish()
    }
}

impl<K, V> BatchedLoader<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a loader around a bulk fetch.
    pub fn new(name: &'static str, fetcher: impl BatchFn<K, V>, config: &LoaderConfig) -> Self {
        Self::from_arc(name, Arc::new(fetcher), config)
    }

    /// Create a loader around a shared bulk fetch.
    pub fn from_arc(
        name: &'static str,
        fetcher: Arc<dyn BatchFn<K, V>>,
        config: &LoaderConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                fetcher,
                max_batch_size: config.max_batch_size.max(1),
                batch_delay_ticks: config.batch_delay_ticks,
                cache: config.cache,
                log_batches: false,
                state: Mutex::new(State {
                    slots: HashMap::new(),
                    pending: Vec::new(),
                    epoch: 0,
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// Log dispatched batches at `info` rather than `debug`.
    ///
    /// Only takes effect before the loader is shared.
    pub fn with_batch_logging(mut self, enabled: bool) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.log_batches = enabled;
        }
        self
    }

    /// Loader name used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Request one key.
    ///
    /// The key is enqueued when this is called, not when the returned future
    /// is first polled. The batch is flushed once a returned future is
    /// awaited, so at least one load of every batch must be driven.
    pub fn load(&self, key: K) -> impl Future<Output = QueryResult<Option<V>>> + Send + 'static {
        Counters::bump(&self.inner.counters.loads, 1);

        let mut state = self.inner.state.lock();
        if let Some(slot) = state.slots.get(&key) {
            Counters::bump(&self.inner.counters.cache_hits, 1);
            trace!(loader = self.inner.name, ?key, "cache hit");
            return slot.clone();
        }

        let (tx, rx) = oneshot::channel();
        let name = self.inner.name;
        let epoch = state.epoch;
        // Weak, or the stored slot would keep its own loader alive.
        let inner = Arc::downgrade(&self.inner);
        let slot: Slot<V> = async move {
            if let Some(inner) = inner.upgrade() {
                inner.flush(epoch).await;
            }
            rx.await.unwrap_or_else(|_| {
                Err(QueryError::internal("batch dropped before resolving").with_loader(name))
            })
        }
        .boxed()
        .shared();

        state.slots.insert(key.clone(), slot.clone());
        state.pending.push(Pending { key, tx });
        slot
    }

    /// Request several keys; the result keeps input order and duplicates.
    ///
    /// Fails with the first rejection among the keys.
    pub fn load_many<I>(
        &self,
        keys: I,
    ) -> impl Future<Output = QueryResult<Vec<Option<V>>>> + Send + 'static
    where
        I: IntoIterator<Item = K>,
    {
        let requests: Vec<_> = keys.into_iter().map(|key| self.load(key)).collect();
        future::try_join_all(requests)
    }

    /// Seed a value. A key that is already pending or resolved keeps its
    /// existing future and `false` is returned.
    pub fn prime(&self, key: K, value: V) -> bool {
        self.prime_with(key, Some(value))
    }

    /// Seed a key as having no value.
    pub fn prime_absent(&self, key: K) -> bool {
        self.prime_with(key, None)
    }

    fn prime_with(&self, key: K, value: Option<V>) -> bool {
        if !self.inner.cache {
            return false;
        }
        let mut state = self.inner.state.lock();
        if state.slots.contains_key(&key) {
            return false;
        }
        let ready: BoxFuture<'static, QueryResult<Option<V>>> = Box::pin(future::ready(Ok(value)));
        state.slots.insert(key, ready.shared());
        Counters::bump(&self.inner.counters.primed, 1);
        true
    }

    /// Forget a memoized key so the next load fetches it again.
    ///
    /// A key still waiting for dispatch is left alone.
    pub fn clear(&self, key: &K) -> bool {
        let mut state = self.inner.state.lock();
        if state.pending.iter().any(|p| &p.key == key) {
            return false;
        }
        state.slots.remove(key).is_some()
    }

    /// Forget every memoized key that is not waiting for dispatch.
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        let State { slots, pending, .. } = &mut *state;
        slots.retain(|key, _| pending.iter().any(|p| &p.key == key));
    }

    /// Check whether a key has a future, pending or resolved.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.state.lock().slots.contains_key(key)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> LoaderStats {
        self.inner.counters.snapshot()
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Yield, then flush the batch that was open when the waiter enqueued.
    ///
    /// Only the first waiter of a batch to get here finds it still open; the
    /// rest fall through to their receivers. Keys enqueued after the flush
    /// belong to a later epoch and wait for one of their own waiters.
    async fn flush(self: Arc<Self>, epoch: u64) {
        for _ in 0..self.batch_delay_ticks.max(1) {
            tokio::task::yield_now().await;
        }

        let Some(mut batch) = self.take_pending(epoch) else {
            return;
        };
        trace!(loader = self.name, epoch, keys = batch.len(), "closing batch");

        let mut chunks = Vec::with_capacity(batch.len().div_ceil(self.max_batch_size));
        while batch.len() > self.max_batch_size {
            let rest = batch.split_off(self.max_batch_size);
            chunks.push(batch);
            batch = rest;
        }
        chunks.push(batch);

        future::join_all(chunks.into_iter().map(|chunk| self.run_batch(chunk))).await;
    }

    fn take_pending(&self, epoch: u64) -> Option<Vec<Pending<K, V>>> {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.pending.is_empty() {
            return None;
        }
        state.epoch += 1;
        Some(std::mem::take(&mut state.pending))
    }

    async fn run_batch(&self, chunk: Vec<Pending<K, V>>) {
        let keys: Vec<K> = chunk.iter().map(|p| p.key.clone()).collect();
        Counters::bump(&self.counters.batches, 1);
        Counters::bump(&self.counters.keys_fetched, keys.len() as u64);

        if self.log_batches {
            info!(loader = self.name, keys = keys.len(), "dispatching batch");
        } else {
            debug!(loader = self.name, keys = keys.len(), "dispatching batch");
        }

        let outcome = self.fetcher.fetch_many(&keys).await.and_then(|values| {
            if values.len() == keys.len() {
                Ok(values)
            } else {
                Err(QueryError::batch_misaligned(self.name, keys.len(), values.len()))
            }
        });

        match outcome {
            Ok(values) => {
                for (pending, value) in chunk.into_iter().zip(values) {
                    let _ = pending.tx.send(Ok(value));
                }
            }
            Err(cause) => {
                Counters::bump(&self.counters.failed_batches, 1);
                let error = if cause.code == ErrorCode::BatchMisaligned {
                    cause
                } else {
                    QueryError::batch_failed(self.name, keys.len(), &cause)
                };
                warn!(loader = self.name, keys = keys.len(), error = %error, "batch failed");
                self.resolve_all(chunk, Err(error));
            }
        }

        if !self.cache {
            let mut state = self.state.lock();
            for key in &keys {
                state.slots.remove(key);
            }
        }
    }

    fn resolve_all(&self, batch: Vec<Pending<K, V>>, outcome: QueryResult<Option<V>>) {
        for pending in batch {
            let _ = pending.tx.send(outcome.clone());
        }
    }
}
