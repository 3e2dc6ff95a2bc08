//! # Worker
//!
//! One worker loop: take a key from the queue, reconcile it, release it.
//!
//! The key is released through a drop guard, so `done` runs on every exit
//! path including a panicking reconcile. A leaked processing marker would
//! block every future add of that key.

use crate::queue::{QueueItem, WorkQueue};
use crate::reconciler::Reconciler;
use crate::resource::ResourceIdentity;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};

struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a ResourceIdentity,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

pub(super) async fn run_worker(id: usize, queue: WorkQueue, reconciler: Arc<Reconciler>) {
    debug!(worker = id, "worker started");
    while process_next_item(&queue, &reconciler).await {}
    debug!(worker = id, "worker stopped");
}

/// Process one key from `queue`
///
/// Returns `false` once the queue is shut down and empty; the worker should exit.
pub async fn process_next_item(queue: &WorkQueue, reconciler: &Reconciler) -> bool {
    let key = match queue.get().await {
        QueueItem::Item(key) => key,
        QueueItem::ShuttingDown => return false,
    };
    let _done = DoneGuard { queue, key: &key };

    let span = info_span!(
        "reconcile",
        resource.namespace = key.namespace(),
        resource.name = key.name()
    );
    let result = AssertUnwindSafe(reconciler.reconcile(&key))
        .catch_unwind()
        .instrument(span)
        .await;

    match result {
        Ok(Ok(outcome)) => {
            queue.forget(&key);
            debug!(resource = %key, ?outcome, "reconciliation succeeded");
        }
        Ok(Err(e)) => requeue(queue, &key, &e),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(resource = %key, panic = %message, "reconciliation panicked");
            requeue(queue, &key, &message);
        }
    }
    true
}

fn requeue(queue: &WorkQueue, key: &ResourceIdentity, error: &dyn fmt::Display) {
    let delay = queue.add_rate_limited(key.clone());
    let attempts = queue.num_requeues(key);
    let next_retry = chrono::Utc::now()
        + chrono::TimeDelta::from_std(delay).unwrap_or_else(|_| chrono::TimeDelta::zero());

    warn!(
        resource = %key,
        error = %error,
        attempts,
        retry_in = ?delay,
        next_retry = %next_retry.to_rfc3339(),
        "reconciliation failed, requeued with backoff"
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
