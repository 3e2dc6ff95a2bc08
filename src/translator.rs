//! # Event Translator
//!
//! Turns watch notifications into cache writes and work queue keys.
//!
//! The translator is the single writer of the [`ResourceCache`]. Added and
//! Deleted notifications always enqueue. Updated notifications enqueue only
//! when the `resourceVersion` changed; an unchanged version is a resync echo
//! and is suppressed before it reaches the queue. Payloads that cannot be
//! interpreted are logged and dropped.

use crate::cache::ResourceCache;
use crate::observability::metrics;
use crate::queue::WorkQueue;
use crate::resource::{ResourceIdentity, ResourcePayload, TranslationError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A change observed on one resource
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K> Notification<K> {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated { .. } => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// Everything a notification source can emit
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent<K> {
    Notification(Notification<K>),
    /// All objects that existed when the source started have been delivered
    InitialListDone,
}

impl<K> From<Notification<K>> for SourceEvent<K> {
    fn from(notification: Notification<K>) -> Self {
        Self::Notification(notification)
    }
}

/// What the translator did with one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Cache updated and key enqueued
    Enqueued(ResourceIdentity),
    /// Cache updated, enqueue suppressed (unchanged resourceVersion)
    Skipped(ResourceIdentity),
    /// Payload could not be interpreted; nothing changed
    Dropped(TranslationError),
}

#[derive(Debug, Clone)]
pub struct EventTranslator {
    cache: Arc<ResourceCache>,
    queue: WorkQueue,
}

impl EventTranslator {
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, queue: WorkQueue) -> Self {
        Self { cache, queue }
    }

    /// Apply one notification to the cache and queue
    pub fn handle<K: ResourcePayload>(&self, notification: &Notification<K>) -> Disposition {
        metrics::increment_notifications(notification.kind());

        let result = match notification {
            Notification::Added(obj) => obj.to_snapshot().map(|snapshot| {
                let key = snapshot.identity.clone();
                self.cache.upsert(snapshot);
                self.queue.add(key.clone());
                Disposition::Enqueued(key)
            }),
            // An uninterpretable `old` counts as changed
            Notification::Updated { old, new } => new.to_snapshot().map(|new| {
                let key = new.identity.clone();
                let unchanged = old
                    .to_snapshot()
                    .is_ok_and(|old| old.resource_version == new.resource_version);
                self.cache.upsert(new);
                if unchanged {
                    metrics::increment_notifications_skipped();
                    Disposition::Skipped(key)
                } else {
                    self.queue.add(key.clone());
                    Disposition::Enqueued(key)
                }
            }),
            Notification::Deleted(obj) => obj.to_snapshot().map(|snapshot| {
                let key = snapshot.identity;
                self.cache.delete(&key);
                self.queue.add(key.clone());
                Disposition::Enqueued(key)
            }),
        };

        match result {
            Ok(disposition) => {
                debug!(kind = notification.kind(), ?disposition, "notification translated");
                disposition
            }
            Err(e) => {
                warn!(kind = notification.kind(), error = %e, "dropping notification with invalid payload");
                metrics::increment_translation_errors();
                Disposition::Dropped(e)
            }
        }
    }

    /// Apply one source event; `InitialListDone` marks the cache synced
    pub fn handle_event<K: ResourcePayload>(&self, event: &SourceEvent<K>) -> Option<Disposition> {
        match event {
            SourceEvent::Notification(notification) => Some(self.handle(notification)),
            SourceEvent::InitialListDone => {
                self.cache.mark_synced();
                None
            }
        }
    }

    /// Consume events until the channel closes or `shutdown` is cancelled
    pub async fn run<K: ResourcePayload>(
        self,
        mut events: mpsc::Receiver<SourceEvent<K>>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event);
                    }
                    None => {
                        warn!("notification source closed");
                        break;
                    }
                },
            }
        }
        info!("event translator stopped");
    }
}
