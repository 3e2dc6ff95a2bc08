//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::SyncPolicy;
use crate::observability::LogFormat;
use crate::queue::rate_limiter::{default_controller_rate_limiter, MaxOfRateLimiter};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Replica count every watched Deployment is converged to
    pub desired_replicas: i32,
    /// Per-key exponential backoff base delay (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-key exponential backoff cap (seconds)
    pub backoff_max_secs: u64,
    /// Overall retry rate across all keys
    pub rate_limit_qps: f64,
    /// Overall retry burst before the token bucket delays
    pub rate_limit_burst: u32,
    /// How long to wait for the initial list before applying `cache_sync_policy` (seconds)
    pub cache_sync_timeout_secs: u64,
    /// What to do when the cache does not sync in time
    pub cache_sync_policy: SyncPolicy,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Log level for this crate (`RUST_LOG` takes precedence)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Capacity of the watch notification channel
    pub watch_buffer: usize,
    /// Capacity of the Kubernetes event channel
    pub event_buffer: usize,
    /// Reporter instance for published events
    pub pod_name: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            workers: DEFAULT_WORKERS,
            desired_replicas: DEFAULT_DESIRED_REPLICAS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            rate_limit_qps: DEFAULT_RATE_LIMIT_QPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            cache_sync_policy: SyncPolicy::default(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            watch_namespace: None,
            watch_buffer: DEFAULT_WATCH_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
            pod_name: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            workers: or_default(var("WORKERS"), defaults.workers),
            desired_replicas: or_default(var("DESIRED_REPLICAS"), defaults.desired_replicas),
            backoff_base_ms: or_default(var("BACKOFF_BASE_MS"), defaults.backoff_base_ms),
            backoff_max_secs: or_default(var("BACKOFF_MAX_SECS"), defaults.backoff_max_secs),
            rate_limit_qps: or_default(var("RATE_LIMIT_QPS"), defaults.rate_limit_qps),
            rate_limit_burst: or_default(var("RATE_LIMIT_BURST"), defaults.rate_limit_burst),
            cache_sync_timeout_secs: or_default(
                var("CACHE_SYNC_TIMEOUT_SECS"),
                defaults.cache_sync_timeout_secs,
            ),
            cache_sync_policy: or_default(var("CACHE_SYNC_POLICY"), defaults.cache_sync_policy),
            metrics_port: or_default(var("METRICS_PORT"), defaults.metrics_port),
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: or_default(var("LOG_FORMAT"), defaults.log_format),
            watch_namespace: var("WATCH_NAMESPACE"),
            watch_buffer: or_default(var("WATCH_BUFFER"), defaults.watch_buffer),
            event_buffer: or_default(var("EVENT_BUFFER"), defaults.event_buffer),
            pod_name: var("POD_NAME"),
        }
    }

    #[must_use]
    pub fn backoff_base_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    #[must_use]
    pub fn cache_sync_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// Work queue rate limiter built from the backoff and bucket settings
    #[must_use]
    pub fn rate_limiter(&self) -> MaxOfRateLimiter {
        default_controller_rate_limiter(
            self.backoff_base_duration(),
            self.backoff_max_duration(),
            self.rate_limit_qps,
            self.rate_limit_burst,
        )
    }
}

/// Parse an optional value or return the default
fn or_default<T: std::str::FromStr>(value: Option<String>, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config.workers, 10);
        assert_eq!(config.desired_replicas, 2);
        assert_eq!(config.backoff_base_duration(), Duration::from_millis(5));
        assert_eq!(config.backoff_max_duration(), Duration::from_secs(1000));
        assert_eq!(config.cache_sync_policy, SyncPolicy::Proceed);
        assert_eq!(config.metrics_port, 8080);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WORKERS", "3"),
            ("DESIRED_REPLICAS", "5"),
            ("CACHE_SYNC_POLICY", "abort"),
            ("LOG_FORMAT", "json"),
            ("WATCH_NAMESPACE", "apps"),
        ]));
        assert_eq!(config.workers, 3);
        assert_eq!(config.desired_replicas, 5);
        assert_eq!(config.cache_sync_policy, SyncPolicy::Abort);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WORKERS", "many"),
            ("METRICS_PORT", "99999"),
            ("CACHE_SYNC_POLICY", "maybe"),
            ("WATCH_NAMESPACE", "  "),
        ]));
        assert_eq!(config.workers, 10);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.cache_sync_policy, SyncPolicy::Proceed);
        assert!(config.watch_namespace.is_none());
    }
}
