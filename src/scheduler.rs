//! Time-windowed release of independent remote reads.
//!
//! A [`QueryScheduler`] takes an ordered list of [`QueryDescriptor`]s and
//! releases them in waves: cached entries and the first `batch_size` uncached
//! entries go out immediately, then one more wave of at most `batch_size` per
//! `batch_interval` until the queue is drained. Progress is published through a
//! [`watch`] channel as index-aligned [`QueueSnapshot`]s.
//!
//! Completion means every item has been *released*, not that every fetch has
//! resolved; [`ScheduledQueries::wait_complete`] waits for both.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::config::SchedulerConfig;
use crate::errors::EngineResult;

pub type FetchFuture<V> = BoxFuture<'static, EngineResult<V>>;

/// A named remote read: the cache key plus the function that performs it.
pub struct QueryDescriptor<V> {
    key: QueryKey,
    fetch: Arc<dyn Fn() -> FetchFuture<V> + Send + Sync>,
}

impl<V: 'static> QueryDescriptor<V> {
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<V>> + Send + 'static,
    {
        Self {
            key,
            fetch: Arc::new(move || fetch().boxed()),
        }
    }
}

impl<V> QueryDescriptor<V> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<V> Clone for QueryDescriptor<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<V> fmt::Debug for QueryDescriptor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Combined view over every scheduled read of one generation.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueSnapshot<V> {
    pub generation: u64,
    /// One slot per input descriptor, in input order.
    pub data: Vec<Option<V>>,
    /// Every item has been released into the active set.
    pub is_complete: bool,
    /// At least one released fetch has not resolved yet.
    pub is_fetching: bool,
    pub is_loading: bool,
    pub first_error: Option<String>,
    /// Uncached items released per wave; cache hits are not counted.
    pub waves: Vec<usize>,
    pub cached: usize,
    pub released: usize,
}

impl<V> QueueSnapshot<V> {
    fn empty() -> Self {
        Self {
            generation: 0,
            data: Vec::new(),
            is_complete: true,
            is_fetching: false,
            is_loading: false,
            first_error: None,
            waves: Vec::new(),
            cached: 0,
            released: 0,
        }
    }

    /// Slots that resolved, in input order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.iter().flatten()
    }
}

struct QueueState<V> {
    generation: u64,
    descriptors: Vec<QueryDescriptor<V>>,
    data: Vec<Option<V>>,
    errors: Vec<Option<String>>,
    queue: VecDeque<usize>,
    released: usize,
    cached: usize,
    pending: usize,
    waves: Vec<usize>,
}

impl<V: Clone> QueueState<V> {
    fn empty() -> Self {
        Self {
            generation: 0,
            descriptors: Vec::new(),
            data: Vec::new(),
            errors: Vec::new(),
            queue: VecDeque::new(),
            released: 0,
            cached: 0,
            pending: 0,
            waves: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.released == self.descriptors.len()
    }

    fn snapshot(&self) -> QueueSnapshot<V> {
        let is_complete = self.is_complete();
        let is_fetching = self.pending > 0;
        QueueSnapshot {
            generation: self.generation,
            data: self.data.clone(),
            is_complete,
            is_fetching,
            is_loading: !is_complete || is_fetching,
            first_error: self.errors.iter().flatten().next().cloned(),
            waves: self.waves.clone(),
            cached: self.cached,
            released: self.released,
        }
    }
}

struct Shared<V> {
    config: SchedulerConfig,
    cache: Arc<QueryCache<V>>,
    state: Mutex<QueueState<V>>,
    tx: watch::Sender<QueueSnapshot<V>>,
}

impl<V> Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Resets to a new generation and releases the initial wave.
    fn start(self: &Arc<Self>, descriptors: Vec<QueryDescriptor<V>>) -> Option<JoinHandle<()>> {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        let total = descriptors.len();

        let mut data = vec![None; total];
        let mut queue = VecDeque::new();
        let mut cached = 0;
        for (index, descriptor) in descriptors.iter().enumerate() {
            match self.cache.get(descriptor.key()) {
                Some(value) => {
                    data[index] = Some(value);
                    cached += 1;
                }
                None => queue.push_back(index),
            }
        }

        *state = QueueState {
            generation,
            descriptors,
            data,
            errors: vec![None; total],
            queue,
            released: cached,
            cached,
            pending: 0,
            waves: Vec::new(),
        };
        debug!(generation, total, cached, "scheduling queries");

        if !state.queue.is_empty() {
            self.release_wave(&mut state);
        }
        self.publish(&state);

        if state.queue.is_empty() {
            return None;
        }
        Some(self.spawn_timer(generation))
    }

    fn spawn_timer(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        let period = self.config.batch_interval();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let drained = {
                    let mut state = shared.state.lock();
                    if state.generation != generation {
                        true
                    } else {
                        shared.release_wave(&mut state);
                        shared.publish(&state);
                        state.queue.is_empty()
                    }
                };
                if drained {
                    break;
                }
            }
        })
    }

    fn release_wave(self: &Arc<Self>, state: &mut QueueState<V>) {
        let batch = self.config.batch_size.max(1).min(state.queue.len());
        let generation = state.generation;
        for _ in 0..batch {
            let Some(index) = state.queue.pop_front() else {
                break;
            };
            let descriptor = state.descriptors[index].clone();
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                let result = (descriptor.fetch)().await;
                shared.complete(generation, index, descriptor.key, result);
            });
        }
        state.released += batch;
        state.pending += batch;
        state.waves.push(batch);
        debug!(
            generation,
            wave = state.waves.len(),
            released = batch,
            remaining = state.queue.len(),
            "released query wave"
        );
    }

    fn complete(&self, generation: u64, index: usize, key: QueryKey, result: EngineResult<V>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation, current = state.generation, %key, "discarding stale query result");
            return;
        }
        state.pending = state.pending.saturating_sub(1);
        match result {
            Ok(value) => {
                self.cache.insert(key, value.clone());
                state.data[index] = Some(value);
                state.errors[index] = None;
            }
            Err(err) => {
                warn!(generation, %key, error = %err, "scheduled query failed");
                state.errors[index] = Some(err.to_string());
            }
        }
        self.publish(&state);
    }

    fn publish(&self, state: &QueueState<V>) {
        self.tx.send_replace(state.snapshot());
    }
}

/// Releases descriptor lists in waves according to a [`SchedulerConfig`].
#[derive(Clone, Debug, Default)]
pub struct QueryScheduler {
    config: SchedulerConfig,
}

impl QueryScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starts releasing `descriptors`. Must be called from within a Tokio runtime.
    pub fn schedule<V>(
        &self,
        descriptors: Vec<QueryDescriptor<V>>,
        cache: Arc<QueryCache<V>>,
    ) -> ScheduledQueries<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let (tx, _rx) = watch::channel(QueueSnapshot::empty());
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            cache,
            state: Mutex::new(QueueState::empty()),
            tx,
        });
        let timer = shared.start(descriptors);
        ScheduledQueries { shared, timer }
    }
}

/// Handle to one scheduled list. Dropping it stops further waves.
pub struct ScheduledQueries<V> {
    shared: Arc<Shared<V>>,
    timer: Option<JoinHandle<()>>,
}

impl<V> ScheduledQueries<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn snapshot(&self) -> QueueSnapshot<V> {
        self.shared.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot<V>> {
        self.shared.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Replaces the input list. The previous wave timer is cancelled and
    /// results of the previous generation are dropped when they arrive.
    pub fn reissue(&mut self, descriptors: Vec<QueryDescriptor<V>>) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.timer = self.shared.start(descriptors);
    }

    /// Resolves once every item is released and no fetch is outstanding.
    pub async fn wait_complete(&self) -> QueueSnapshot<V> {
        let mut rx = self.shared.tx.subscribe();
        let settled = rx
            .wait_for(|snapshot| snapshot.is_complete && !snapshot.is_fetching)
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }
}

impl<V> Drop for ScheduledQueries<V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
