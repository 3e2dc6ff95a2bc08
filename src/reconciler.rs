//! # Reconciler
//!
//! Idempotent convergence step for one resource key.
//!
//! ## Reconciliation Flow
//!
//! 1. Look up the key in the cache. Absent means the resource is gone: success, nothing to do.
//! 2. Compare the observed replica count with the desired count.
//! 3. If they differ, ask the [`ReplicaScaler`] to converge it.
//! 4. Record a `Synced` event on success or a `ScaleFailed` warning on failure.
//!
//! Every error returned here is retryable; the worker pool re-adds the key with backoff.

use crate::cache::ResourceCache;
use crate::events::{ControllerEvent, EventSink, REASON_SCALE_FAILED, REASON_SYNCED};
use crate::observability::metrics;
use crate::resource::ResourceIdentity;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of the external mutation interface
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("scale request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to scale {key} to {replicas} replicas: {source}")]
    Scale {
        key: ResourceIdentity,
        replicas: i32,
        #[source]
        source: ScaleError,
    },
}

/// What a successful reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists
    NotFound,
    /// Already at the desired replica count
    Converged { replicas: i32 },
    /// Replica count was changed
    Scaled { from: i32, to: i32 },
}

/// Mutation interface: set the replica count of a resource
///
/// Implementations must be idempotent; scaling to the current count is a no-op.
#[async_trait]
pub trait ReplicaScaler: Send + Sync {
    async fn scale(&self, key: &ResourceIdentity, replicas: i32) -> Result<(), ScaleError>;
}

#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<ResourceCache>,
    scaler: Arc<dyn ReplicaScaler>,
    events: Arc<dyn EventSink>,
    desired_replicas: i32,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("desired_replicas", &self.desired_replicas)
            .field("cached_objects", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        cache: Arc<ResourceCache>,
        scaler: Arc<dyn ReplicaScaler>,
        events: Arc<dyn EventSink>,
        desired_replicas: i32,
    ) -> Self {
        Self {
            cache,
            scaler,
            events,
            desired_replicas,
        }
    }

    /// Converge the resource addressed by `key`
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Scale`] when the mutation interface fails.
    pub async fn reconcile(&self, key: &ResourceIdentity) -> Result<ReconcileOutcome, ReconcileError> {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = self.converge(key).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::increment_reconciliation_errors();
        }
        result
    }

    async fn converge(&self, key: &ResourceIdentity) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(snapshot) = self.cache.get(key) else {
            debug!(resource.namespace = key.namespace(), resource.name = key.name(), "resource no longer exists, nothing to do");
            return Ok(ReconcileOutcome::NotFound);
        };

        let current = snapshot.state.replicas;
        let desired = self.desired_replicas;

        let outcome = if current == desired {
            debug!(replicas = current, "replica count already converged");
            ReconcileOutcome::Converged { replicas: current }
        } else {
            info!(
                resource.namespace = key.namespace(),
                resource.name = key.name(),
                from = current,
                to = desired,
                "scaling resource"
            );
            if let Err(e) = self.scaler.scale(key, desired).await {
                warn!(resource.namespace = key.namespace(), resource.name = key.name(), error = %e, "scale request failed");
                self.events.record(ControllerEvent::warning(
                    key.clone(),
                    REASON_SCALE_FAILED,
                    format!("Failed to scale {key} to {desired} replicas: {e}"),
                ));
                return Err(ReconcileError::Scale {
                    key: key.clone(),
                    replicas: desired,
                    source: e,
                });
            }
            metrics::increment_scale_operations();
            ReconcileOutcome::Scaled {
                from: current,
                to: desired,
            }
        };

        self.events.record(ControllerEvent::normal(
            key.clone(),
            REASON_SYNCED,
            format!("Deployment {key} synced successfully"),
        ));
        Ok(outcome)
    }
}
