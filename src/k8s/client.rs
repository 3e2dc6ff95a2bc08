//! # Client
//!
//! Kubernetes client construction. Without flags the configuration is
//! inferred (in-cluster service account, then `KUBECONFIG`/`~/.kube/config`).

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

/// Build a client from an explicit kubeconfig and/or API server override
///
/// # Errors
///
/// Fails when the kubeconfig cannot be read, no configuration can be inferred,
/// or `master` is not a valid URL.
pub async fn build_client(kubeconfig: Option<&Path>, master: Option<&str>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("invalid kubeconfig {}", path.display()))?
        }
        None => Config::infer()
            .await
            .context("failed to infer Kubernetes configuration")?,
    };

    if let Some(master) = master {
        config.cluster_url = master
            .parse()
            .with_context(|| format!("invalid API server URL '{master}'"))?;
    }

    info!(cluster_url = %config.cluster_url, "connecting to Kubernetes API");
    Client::try_from(config).context("failed to create Kubernetes client")
}
