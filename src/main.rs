//! Replica Controller
//!
//! Watches Deployments and converges each one to the configured replica count.

use anyhow::{bail, Context, Result};
use clap::Parser;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use replica_controller::cache::ResourceCache;
use replica_controller::config::{Cli, ControllerConfig};
use replica_controller::constants::CONTROLLER_NAME;
use replica_controller::controller::{Controller, ControllerOptions};
use replica_controller::events::ChannelEventSink;
use replica_controller::k8s::{
    build_client, run_deployment_watch, spawn_event_publisher, DeploymentScaler,
};
use replica_controller::observability::{self, init_tracing};
use replica_controller::queue::WorkQueue;
use replica_controller::reconciler::Reconciler;
use replica_controller::server::{start_server, ServerState};
use replica_controller::signals;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        bail!("Failed to install rustls crypto provider");
    }

    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env();
    cli.apply(&mut config);

    init_tracing(&config.log_level, config.log_format)?;

    info!("Starting Replica Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        workers = config.workers,
        desired_replicas = config.desired_replicas,
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "Controller configuration loaded"
    );

    observability::register_metrics()?;

    let shutdown = signals::shutdown_on_signal().context("Failed to install signal handlers")?;

    let client = build_client(cli.kubeconfig.as_deref(), cli.master.as_deref()).await?;

    // Engine
    let cache = Arc::new(ResourceCache::new());
    let queue = WorkQueue::with_rate_limiter(CONTROLLER_NAME, Box::new(config.rate_limiter()));
    let (sink, event_rx) = ChannelEventSink::new(config.event_buffer);
    let publisher = spawn_event_publisher(client.clone(), config.pod_name.clone(), event_rx);
    let reconciler = Reconciler::new(
        Arc::clone(&cache),
        Arc::new(DeploymentScaler::new(client.clone())),
        Arc::new(sink),
        config.desired_replicas,
    );
    let controller = Controller::new(cache, queue, reconciler, ControllerOptions::from(&config));

    // Start HTTP server for metrics and probes
    let server_state = Arc::new(ServerState {
        controller_state: controller.subscribe_state(),
    });
    let server_port = config.metrics_port;
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Notification source
    let deployments: Api<Deployment> = match config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    let (tx, rx) = mpsc::channel(config.watch_buffer);
    let watch = tokio::spawn(run_deployment_watch(deployments, tx, shutdown.clone()));

    let result = controller.run(rx, shutdown.clone()).await;

    // The controller may also stop on its own (sync abort); stop everything else with it
    shutdown.cancel();
    if let Err(e) = watch.await {
        error!("Deployment watch task failed: {}", e);
    }
    if let Err(e) = server.await {
        error!("HTTP server task failed: {}", e);
    }

    // Dropping the controller drops the last event sink, which ends the publisher
    drop(controller);
    if let Err(e) = publisher.await {
        error!("Event publisher task failed: {}", e);
    }

    result.context("Controller failed")?;
    info!("Controller stopped");
    Ok(())
}
