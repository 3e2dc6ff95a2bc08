//! # Command Line
//!
//! Flags for running the controller out of cluster. Everything else is
//! configured through the environment (see [`ControllerConfig`]).

use super::ControllerConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "replica-controller")]
#[command(version, about = "Converges Deployment replica counts to a fixed target")]
pub struct Cli {
    /// Path to a kubeconfig. Only required if out-of-cluster.
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Address of the Kubernetes API server. Overrides any value in kubeconfig.
    #[arg(long, value_name = "URL")]
    pub master: Option<String>,

    /// Number of concurrent reconciliation workers (overrides WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl Cli {
    /// Layer flag overrides on top of the environment configuration
    pub fn apply(&self, config: &mut ControllerConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}
