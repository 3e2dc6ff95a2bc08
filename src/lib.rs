//! Replica Controller Library
//!
//! A level-triggered reconciliation engine that keeps every watched Deployment
//! at a fixed replica count, plus the kube-rs adapters that connect it to a
//! cluster.
//!
//! ```text
//! watch -> EventTranslator -> ResourceCache + WorkQueue -> workers -> Reconciler -> ReplicaScaler
//! ```
//!
//! The engine (`cache`, `translator`, `queue`, `reconciler`, `controller`) has
//! no dependency on a cluster; `k8s` provides the Kubernetes implementations
//! of its seams.

pub mod cache;
pub mod config;
pub mod constants;
pub mod controller;
pub mod events;
pub mod k8s;
pub mod observability;
pub mod queue;
pub mod reconciler;
pub mod resource;
pub mod server;
pub mod signals;
pub mod translator;

pub mod prelude;
