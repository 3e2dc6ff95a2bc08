//! # Kubernetes Adapters
//!
//! kube-rs implementations of the engine's external interfaces for `apps/v1`
//! Deployments.
//!
//! - `source`: watch stream to [`SourceEvent`](crate::translator::SourceEvent) notifications
//! - `scaler`: [`ReplicaScaler`](crate::reconciler::ReplicaScaler) via merge patch
//! - `recorder`: publishes reconciliation events as Kubernetes Events
//! - `client`: client construction from kubeconfig or in-cluster config

pub mod client;
pub mod recorder;
pub mod scaler;
pub mod source;

pub use client::build_client;
pub use recorder::spawn_event_publisher;
pub use scaler::DeploymentScaler;
pub use source::{run_deployment_watch, WatchTracker};

use crate::resource::{
    ReplicaState, ResourceIdentity, ResourcePayload, ResourceSnapshot, TranslationError,
};
use k8s_openapi::api::apps::v1::Deployment;

/// Replica count the API server assumes when `spec.replicas` is unset
const DEFAULT_SPEC_REPLICAS: i32 = 1;

impl ResourcePayload for Deployment {
    fn to_snapshot(&self) -> Result<ResourceSnapshot, TranslationError> {
        let name = self
            .metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(TranslationError::MissingName)?;
        let identity =
            ResourceIdentity::new(self.metadata.namespace.clone().unwrap_or_default(), name);

        let Some(resource_version) = self
            .metadata
            .resource_version
            .clone()
            .filter(|rv| !rv.is_empty())
        else {
            return Err(TranslationError::MissingResourceVersion { key: identity });
        };

        let replicas = self
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(DEFAULT_SPEC_REPLICAS);
        if replicas < 0 {
            return Err(TranslationError::InvalidReplicas {
                key: identity,
                replicas,
            });
        }

        Ok(ResourceSnapshot::new(
            identity,
            resource_version,
            ReplicaState::new(replicas),
        ))
    }
}
