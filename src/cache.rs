//! # Resource Cache
//!
//! In-memory, thread-safe store of the latest observed snapshot per resource.
//!
//! The cache has a single writer (the event translator) and many readers (the
//! workers). Entries are stored as `Arc<ResourceSnapshot>` and replaced
//! wholesale under the write lock, so a reader always sees either the previous
//! or the next snapshot, never a partially written one.
//!
//! The `synced` flag flips to `true` exactly once, after the initial list has
//! been applied. `get` does not consult the flag; callers that care about
//! freshness check [`ResourceCache::is_synced`] themselves.

use crate::resource::{ResourceIdentity, ResourceSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug)]
pub struct ResourceCache {
    entries: RwLock<HashMap<ResourceIdentity, Arc<ResourceSnapshot>>>,
    synced: watch::Sender<bool>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            entries: RwLock::new(HashMap::new()),
            synced,
        }
    }

    /// Insert or replace the snapshot for its identity, returning the previous one
    pub fn upsert(&self, snapshot: ResourceSnapshot) -> Option<Arc<ResourceSnapshot>> {
        let snapshot = Arc::new(snapshot);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.identity.clone(), snapshot)
    }

    /// Remove the entry for `key`, returning it if it existed
    pub fn delete(&self, key: &ResourceIdentity) -> Option<Arc<ResourceSnapshot>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Point lookup; `None` means the resource is not (or no longer) known
    #[must_use]
    pub fn get(&self, key: &ResourceIdentity) -> Option<Arc<ResourceSnapshot>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(Arc::clone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declare the initial population complete. Later calls are no-ops.
    pub fn mark_synced(&self) {
        let first = self.synced.send_if_modified(|synced| {
            if *synced {
                false
            } else {
                *synced = true;
                true
            }
        });
        if first {
            info!(objects = self.len(), "resource cache synced");
        }
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resolve once [`ResourceCache::mark_synced`] has been called
    pub async fn wait_for_sync(&self) {
        let mut rx = self.synced.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here
        let _ = rx.wait_for(|synced| *synced).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ReplicaState;
    use std::time::Duration;

    fn snapshot(ns: &str, name: &str, rv: &str, replicas: i32) -> ResourceSnapshot {
        ResourceSnapshot::new(
            ResourceIdentity::new(ns, name),
            rv,
            ReplicaState::new(replicas),
        )
    }

    #[test]
    fn test_upsert_replaces_entry_wholesale() {
        let cache = ResourceCache::new();
        assert!(cache.upsert(snapshot("ns", "app", "1", 1)).is_none());
        let previous = cache.upsert(snapshot("ns", "app", "2", 3)).unwrap();
        assert_eq!(previous.resource_version, "1");

        let current = cache.get(&ResourceIdentity::new("ns", "app")).unwrap();
        assert_eq!(current.resource_version, "2");
        assert_eq!(current.state.replicas, 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_removes_entry() {
        let cache = ResourceCache::new();
        cache.upsert(snapshot("ns", "app", "1", 1));
        let key = ResourceIdentity::new("ns", "app");
        assert!(cache.delete(&key).is_some());
        assert!(cache.get(&key).is_none());
        assert!(cache.delete(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_returns_partial_data_before_sync() {
        let cache = ResourceCache::new();
        cache.upsert(snapshot("ns", "app", "1", 1));
        assert!(!cache.is_synced());
        assert!(cache.get(&ResourceIdentity::new("ns", "app")).is_some());
    }

    #[test]
    fn test_mark_synced_is_sticky() {
        let cache = ResourceCache::new();
        cache.mark_synced();
        cache.mark_synced();
        assert!(cache.is_synced());
    }

    #[tokio::test]
    async fn test_wait_for_sync_resolves_after_mark() {
        let cache = Arc::new(ResourceCache::new());
        let waiter = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.wait_for_sync().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        cache.mark_synced();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_for_sync should resolve")
            .unwrap();
    }
}
