//! # Deployment Watch Source
//!
//! Feeds the event translator from a `kube::runtime::watcher` stream.
//!
//! The watcher reports state (`Apply`, `Delete`, and `Init`/`InitApply`/`InitDone`
//! around every re-list) rather than changes. [`WatchTracker`] remembers the
//! last object seen per key so that:
//!
//! - an `Apply` for a known object becomes `Updated { old, new }`, and an
//!   unchanged object on re-list is recognised by the translator as an echo;
//! - objects missing from a re-list are reported as `Deleted`;
//! - the first `InitDone` emits [`SourceEvent::InitialListDone`].

use crate::resource::ResourceIdentity;
use crate::translator::{Notification, SourceEvent};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::pin::pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Converts watcher state events into change notifications
#[derive(Debug)]
pub struct WatchTracker<K> {
    known: HashMap<ResourceIdentity, K>,
    /// Keys seen during the re-list in progress
    relist: Option<HashSet<ResourceIdentity>>,
    initial_list_done: bool,
}

impl<K> Default for WatchTracker<K> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relist: None,
            initial_list_done: false,
        }
    }
}

fn identity_of<K: Resource>(obj: &K) -> ResourceIdentity {
    ResourceIdentity::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

impl<K: Resource + Clone> WatchTracker<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently known to exist
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Translate one watcher event into zero or more source events
    pub fn observe(&mut self, event: watcher::Event<K>) -> Vec<SourceEvent<K>> {
        match event {
            watcher::Event::Init => {
                debug!(known = self.known.len(), "re-list started");
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(identity_of(&obj));
                }
                vec![self.apply(obj)]
            }
            watcher::Event::InitDone => {
                let seen = self.relist.take().unwrap_or_default();
                let gone: Vec<ResourceIdentity> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();

                let mut events: Vec<SourceEvent<K>> = gone
                    .iter()
                    .filter_map(|key| self.known.remove(key))
                    .map(|obj| Notification::Deleted(obj).into())
                    .collect();

                if !self.initial_list_done {
                    self.initial_list_done = true;
                    info!(objects = self.known.len(), "initial list complete");
                    events.push(SourceEvent::InitialListDone);
                }
                events
            }
            watcher::Event::Apply(obj) => vec![self.apply(obj)],
            watcher::Event::Delete(obj) => {
                self.known.remove(&identity_of(&obj));
                vec![Notification::Deleted(obj).into()]
            }
        }
    }

    fn apply(&mut self, obj: K) -> SourceEvent<K> {
        match self.known.insert(identity_of(&obj), obj.clone()) {
            Some(old) => Notification::Updated { old, new: obj }.into(),
            None => Notification::Added(obj).into(),
        }
    }
}

/// Watch Deployments and forward notifications until `shutdown` is cancelled
///
/// Stream errors are logged; the watcher re-establishes itself with backoff.
pub async fn run_deployment_watch(
    api: Api<Deployment>,
    tx: mpsc::Sender<SourceEvent<Deployment>>,
    shutdown: CancellationToken,
) {
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut tracker = WatchTracker::new();
    info!("deployment watch started");

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                for event in tracker.observe(event) {
                    if tx.send(event).await.is_err() {
                        info!("notification receiver closed, stopping deployment watch");
                        return;
                    }
                }
            }
            Some(Err(e)) => warn!(error = %e, "deployment watch error, retrying with backoff"),
            None => {
                warn!("deployment watch stream ended");
                break;
            }
        }
    }
    info!("deployment watch stopped");
}
