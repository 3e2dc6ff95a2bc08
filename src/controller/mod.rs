//! # Controller
//!
//! Lifecycle orchestration for the reconciliation engine.
//!
//! ```text
//! Created -> WaitingForSync -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! `run` starts the event translator, waits for the cache to report the
//! initial list as synced, then launches the worker pool. Cancelling the
//! shutdown token shuts the work queue down; the controller is `Stopped` once
//! every worker has observed the shutdown and exited. In-flight
//! reconciliations are allowed to finish.
//!
//! - `worker`: the per-worker dequeue/reconcile/release loop

mod worker;

pub use worker::process_next_item;

use crate::cache::ResourceCache;
use crate::config::ControllerConfig;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::resource::ResourcePayload;
use crate::translator::{EventTranslator, SourceEvent};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    WaitingForSync,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::WaitingForSync => "waiting-for-sync",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What to do when the cache has not synced within the timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Log an error and start the workers against a partial cache
    #[default]
    Proceed,
    /// Log an error and stop the controller
    Abort,
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed" => Ok(Self::Proceed),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unknown cache sync policy '{other}' (expected 'proceed' or 'abort')"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("resource cache did not sync within {timeout:?}")]
    CacheSyncTimeout { timeout: Duration },
}

/// Runtime knobs of the lifecycle
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub workers: usize,
    pub sync_timeout: Duration,
    pub sync_policy: SyncPolicy,
}

impl From<&ControllerConfig> for ControllerOptions {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            workers: config.workers,
            sync_timeout: config.cache_sync_timeout_duration(),
            sync_policy: config.cache_sync_policy,
        }
    }
}

enum SyncWait {
    Synced,
    TimedOut,
    Cancelled,
}

pub struct Controller {
    cache: Arc<ResourceCache>,
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
    options: ControllerOptions,
    state: watch::Sender<ControllerState>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Controller {
    #[must_use]
    pub fn new(
        cache: Arc<ResourceCache>,
        queue: WorkQueue,
        reconciler: Reconciler,
        options: ControllerOptions,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::Created);
        Self {
            cache,
            queue,
            reconciler: Arc::new(reconciler),
            options,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Receiver that observes every lifecycle transition
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ControllerState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "controller state transition");
    }

    /// Run the controller until `shutdown` is cancelled
    ///
    /// `events` is the notification source; it must eventually emit
    /// [`SourceEvent::InitialListDone`] for the workers to start before the
    /// sync timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CacheSyncTimeout`] when the cache does not
    /// sync in time and the sync policy is [`SyncPolicy::Abort`].
    pub async fn run<K>(
        &self,
        events: mpsc::Receiver<SourceEvent<K>>,
        shutdown: CancellationToken,
    ) -> Result<(), ControllerError>
    where
        K: ResourcePayload + Send + 'static,
    {
        self.transition(ControllerState::WaitingForSync);

        let translator = EventTranslator::new(Arc::clone(&self.cache), self.queue.clone());
        let translator_token = shutdown.child_token();
        let translator_task = tokio::spawn(translator.run(events, translator_token.clone()));

        let wait = tokio::select! {
            () = shutdown.cancelled() => SyncWait::Cancelled,
            () = self.cache.wait_for_sync() => SyncWait::Synced,
            () = tokio::time::sleep(self.options.sync_timeout) => SyncWait::TimedOut,
        };

        match wait {
            SyncWait::Synced => info!(objects = self.cache.len(), "cache synced, starting workers"),
            SyncWait::Cancelled => {
                info!("shutdown requested before cache sync");
                self.stop(translator_token, translator_task).await;
                return Ok(());
            }
            SyncWait::TimedOut => {
                error!(
                    timeout = ?self.options.sync_timeout,
                    policy = ?self.options.sync_policy,
                    "timed out waiting for resource cache to sync"
                );
                if self.options.sync_policy == SyncPolicy::Abort {
                    self.stop(translator_token, translator_task).await;
                    return Err(ControllerError::CacheSyncTimeout {
                        timeout: self.options.sync_timeout,
                    });
                }
                warn!("proceeding with a partially populated cache");
            }
        }

        let mut workers = JoinSet::new();
        for id in 0..self.options.workers.max(1) {
            workers.spawn(worker::run_worker(
                id,
                self.queue.clone(),
                Arc::clone(&self.reconciler),
            ));
        }
        self.transition(ControllerState::Running);
        info!(workers = workers.len(), "controller running");

        shutdown.cancelled().await;

        self.transition(ControllerState::ShuttingDown);
        translator_token.cancel();
        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed");
            }
        }
        if let Err(e) = translator_task.await {
            error!(error = %e, "event translator task failed");
        }

        self.transition(ControllerState::Stopped);
        Ok(())
    }

    async fn stop(&self, translator_token: CancellationToken, translator_task: tokio::task::JoinHandle<()>) {
        self.transition(ControllerState::ShuttingDown);
        translator_token.cancel();
        self.queue.shut_down();
        if let Err(e) = translator_task.await {
            error!(error = %e, "event translator task failed");
        }
        self.transition(ControllerState::Stopped);
    }
}
