//! # Work Queue
//!
//! Deduplicating, rate-limited queue of resource keys shared by the event
//! translator (producer) and the worker pool (consumers).
//!
//! Every key is in at most one of `pending` or `processing`:
//!
//! - `add` of a pending key is a no-op.
//! - `add` of a processing key marks it `dirty`; `done` moves it back to pending.
//! - `get` hands each pending key to exactly one worker.
//!
//! Reconciliations of the same key are therefore strictly serialised and a
//! change observed mid-reconcile is never lost.

use super::rate_limiter::{default_controller_rate_limiter, RateLimiter};
use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_QPS,
};
use crate::observability::metrics;
use crate::resource::ResourceIdentity;
use std::collections::{HashSet, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of [`WorkQueue::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A key the caller now owns until it calls [`WorkQueue::done`]
    Item(ResourceIdentity),
    /// The queue is shut down and has nothing left to hand out
    ShuttingDown,
}

#[derive(Debug, Default)]
struct QueueState {
    // FIFO by first insertion; `pending_set` mirrors it for O(1) membership
    pending: VecDeque<ResourceIdentity>,
    pending_set: HashSet<ResourceIdentity>,
    processing: HashSet<ResourceIdentity>,
    dirty: HashSet<ResourceIdentity>,
    shutting_down: bool,
}

impl QueueState {
    fn push(&mut self, key: ResourceIdentity) -> bool {
        if self.pending_set.insert(key.clone()) {
            self.pending.push_back(key);
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Inner {
    name: String,
    state: Mutex<QueueState>,
    /// Wakes `get` callers when a key becomes pending or on shutdown
    available: Notify,
    /// Wakes `shut_down_with_drain` when the last in-flight key is done
    drained: Notify,
    rate_limiter: Box<dyn RateLimiter>,
    /// Cancels delayed adds still sleeping at shutdown
    shutdown: CancellationToken,
}

/// Cheaply cloneable handle to a shared work queue
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Queue with the default controller rate limiter
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(
            name,
            Box::new(default_controller_rate_limiter(
                Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
                Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
                DEFAULT_RATE_LIMIT_QPS,
                DEFAULT_RATE_LIMIT_BURST,
            )),
        )
    }

    #[must_use]
    pub fn with_rate_limiter(name: impl Into<String>, rate_limiter: Box<dyn RateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
                drained: Notify::new(),
                rate_limiter,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark `key` as needing reconciliation
    ///
    /// No-op when the key is already pending or the queue is shutting down.
    pub fn add(&self, key: ResourceIdentity) {
        let mut state = self.state();
        if state.shutting_down {
            debug!(queue = %self.inner.name, key = %key, "queue shutting down, add ignored");
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.push(key) {
            metrics::increment_queue_adds();
            metrics::set_queue_depth(state.pending.len());
            drop(state);
            self.inner.available.notify_one();
        }
    }

    /// Wait for the next pending key
    ///
    /// Items still pending at shutdown are handed out first;
    /// [`QueueItem::ShuttingDown`] is returned only once nothing is left.
    pub async fn get(&self) -> QueueItem {
        loop {
            // Register interest before inspecting state so a concurrent add
            // or shutdown between the check and the await is not missed
            let mut notified = pin!(self.inner.available.notified());
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.pending.pop_front() {
                    state.pending_set.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::set_queue_depth(state.pending.len());
                    let more = !state.pending.is_empty();
                    drop(state);
                    if more {
                        self.inner.available.notify_one();
                    }
                    return QueueItem::Item(key);
                }
                if state.shutting_down {
                    return QueueItem::ShuttingDown;
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing
    ///
    /// A key that was re-added while in flight goes straight back to pending.
    pub fn done(&self, key: &ResourceIdentity) {
        let mut state = self.state();
        if !state.processing.remove(key) {
            warn!(queue = %self.inner.name, key = %key, "done called for a key that was not in processing");
        }

        let requeued = state.dirty.remove(key) && state.push(key.clone());
        if requeued {
            metrics::set_queue_depth(state.pending.len());
        }
        let drained = state.processing.is_empty();
        drop(state);

        if requeued {
            self.inner.available.notify_one();
        }
        if drained {
            self.inner.drained.notify_waiters();
        }
    }

    /// Add `key` once `delay` has elapsed
    ///
    /// The timer is dropped if the queue shuts down before it fires.
    pub fn add_after(&self, key: ResourceIdentity, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(queue = %self.inner.name, key = %key, "no tokio runtime for delayed add, adding immediately");
            self.add(key);
            return;
        };

        let queue = self.clone();
        let shutdown = self.inner.shutdown.clone();
        handle.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => queue.add(key),
            }
        });
    }

    /// Re-add `key` after its rate-limited backoff delay, returning the delay
    pub fn add_rate_limited(&self, key: ResourceIdentity) -> Duration {
        let delay = self.inner.rate_limiter.when(&key);
        metrics::increment_queue_retries();
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure history of `key`; queue membership is unaffected
    pub fn forget(&self, key: &ResourceIdentity) {
        self.inner.rate_limiter.forget(key);
    }

    #[must_use]
    pub fn num_requeues(&self, key: &ResourceIdentity) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Number of pending keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Stop accepting new keys and wake every waiting `get`
    pub fn shut_down(&self) {
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        info!(queue = %self.inner.name, "work queue shutting down");
        self.inner.shutdown.cancel();
        self.inner.available.notify_waiters();
    }

    /// Shut down and wait until no key is in processing
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let mut drained = pin!(self.inner.drained.notified());
            drained.as_mut().enable();
            if self.state().processing.is_empty() {
                return;
            }
            drained.await;
        }
    }
}
