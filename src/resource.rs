//! # Resources
//!
//! Identity and snapshot types for the objects the controller converges.
//!
//! A [`ResourceIdentity`] is the stable `namespace/name` key used by the cache
//! and the work queue. A [`ResourceSnapshot`] is the immutable view of one
//! observed object: its identity, the opaque `resourceVersion` change token and
//! the replica payload the reconciler acts on.

use std::fmt;
use thiserror::Error;

/// Errors raised when a notification payload cannot be interpreted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("object has no metadata.name")]
    MissingName,
    #[error("object {key} has no metadata.resourceVersion")]
    MissingResourceVersion { key: ResourceIdentity },
    #[error("object {key} requests an invalid replica count {replicas}")]
    InvalidReplicas { key: ResourceIdentity, replicas: i32 },
}

/// Stable `(namespace, name)` key addressing a resource
///
/// Ordering is lexicographic on namespace then name, which keeps test output
/// and listings deterministic. Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    namespace: String,
    name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Replica payload carried by a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaState {
    /// Requested replica count (`spec.replicas`)
    pub replicas: i32,
}

impl ReplicaState {
    #[must_use]
    pub const fn new(replicas: i32) -> Self {
        Self { replicas }
    }
}

/// Immutable view of one observed resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub identity: ResourceIdentity,
    /// Opaque change token, compared for equality only
    pub resource_version: String,
    pub state: ReplicaState,
}

impl ResourceSnapshot {
    pub fn new(
        identity: ResourceIdentity,
        resource_version: impl Into<String>,
        state: ReplicaState,
    ) -> Self {
        Self {
            identity,
            resource_version: resource_version.into(),
            state,
        }
    }
}

/// A raw notification payload that can be interpreted as a [`ResourceSnapshot`]
///
/// Implemented for the Kubernetes object types the controller watches and for
/// [`ResourceSnapshot`] itself so the engine can be driven without a cluster.
pub trait ResourcePayload {
    /// Interpret the payload.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] when required fields are missing or invalid.
    fn to_snapshot(&self) -> Result<ResourceSnapshot, TranslationError>;
}

impl ResourcePayload for ResourceSnapshot {
    fn to_snapshot(&self) -> Result<ResourceSnapshot, TranslationError> {
        if self.identity.name().is_empty() {
            return Err(TranslationError::MissingName);
        }
        if self.state.replicas < 0 {
            return Err(TranslationError::InvalidReplicas {
                key: self.identity.clone(),
                replicas: self.state.replicas,
            });
        }
        Ok(self.clone())
    }
}
