//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used for the work queue, the event reporter and log targets
pub const CONTROLLER_NAME: &str = "replica-controller";

/// Default number of concurrent reconciliation workers
pub const DEFAULT_WORKERS: usize = 10;

/// Replica count every Deployment is converged to unless overridden
pub const DEFAULT_DESIRED_REPLICAS: i32 = 2;

/// Default per-item exponential backoff base delay (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Default per-item exponential backoff cap (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Default overall retry rate (requeues per second across all items)
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Default overall retry burst before the token bucket starts delaying
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default time to wait for the initial list before applying the sync policy (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Capacity of the notification channel between the watch source and the translator
pub const DEFAULT_WATCH_BUFFER: usize = 1024;

/// Capacity of the observability event channel; events beyond it are dropped
pub const DEFAULT_EVENT_BUFFER: usize = 1024;
