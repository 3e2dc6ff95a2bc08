//! # Deployment Scaler
//!
//! Sets `spec.replicas` with a JSON merge patch. Patching to the current
//! value is a no-op on the API server, so the call is idempotent.

use crate::constants::CONTROLLER_NAME;
use crate::reconciler::{ReplicaScaler, ScaleError};
use crate::resource::ResourceIdentity;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde::Serialize;
use tracing::debug;

#[derive(Clone)]
pub struct DeploymentScaler {
    client: Client,
}

impl std::fmt::Debug for DeploymentScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentScaler").finish_non_exhaustive()
    }
}

impl DeploymentScaler {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ResourceIdentity) -> Api<Deployment> {
        if key.namespace().is_empty() {
            Api::default_namespaced(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), key.namespace())
        }
    }
}

/// Merge patch body touching only `spec.replicas`
#[derive(Debug, Serialize)]
pub(crate) struct ReplicasPatch {
    spec: ReplicasSpec,
}

#[derive(Debug, Serialize)]
struct ReplicasSpec {
    replicas: i32,
}

impl ReplicasPatch {
    pub(crate) fn new(replicas: i32) -> Self {
        Self {
            spec: ReplicasSpec { replicas },
        }
    }
}

#[async_trait]
impl ReplicaScaler for DeploymentScaler {
    async fn scale(&self, key: &ResourceIdentity, replicas: i32) -> Result<(), ScaleError> {
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        };
        let patch = ReplicasPatch::new(replicas);
        let updated = self
            .api(key)
            .patch(key.name(), &params, &Patch::Merge(&patch))
            .await?;
        debug!(
            resource = %key,
            replicas,
            resource_version = updated.metadata.resource_version.as_deref().unwrap_or_default(),
            "deployment patched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicas_patch_body() {
        assert_eq!(
            serde_json::to_value(ReplicasPatch::new(2)).unwrap(),
            serde_json::json!({ "spec": { "replicas": 2 } })
        );
    }
}
