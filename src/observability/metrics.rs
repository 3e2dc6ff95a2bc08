//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `replica_controller_reconciliations_total` - Total number of reconciliations
//! - `replica_controller_reconciliation_errors_total` - Total number of failed reconciliations
//! - `replica_controller_reconciliation_duration_seconds` - Duration of reconciliations
//! - `replica_controller_scale_operations_total` - Replica mutations issued
//! - `replica_controller_queue_adds_total` - Keys accepted into the work queue
//! - `replica_controller_queue_retries_total` - Rate-limited re-adds
//! - `replica_controller_queue_depth` - Keys currently pending in the work queue
//! - `replica_controller_notifications_total{kind}` - Notifications received by kind
//! - `replica_controller_notifications_skipped_total` - Updates suppressed as resync echoes
//! - `replica_controller_translation_errors_total` - Notifications dropped as uninterpretable

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_reconciliation_errors_total",
        "Total number of failed reconciliations",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "replica_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SCALE_OPERATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_scale_operations_total",
        "Total number of replica count mutations issued",
    )
    .expect("Failed to create SCALE_OPERATIONS_TOTAL metric - this should never happen")
});

static QUEUE_ADDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_queue_adds_total",
        "Total number of keys accepted into the work queue",
    )
    .expect("Failed to create QUEUE_ADDS_TOTAL metric - this should never happen")
});

static QUEUE_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_queue_retries_total",
        "Total number of rate-limited re-adds",
    )
    .expect("Failed to create QUEUE_RETRIES_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "replica_controller_queue_depth",
        "Current number of keys pending in the work queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static NOTIFICATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "replica_controller_notifications_total",
            "Total number of watch notifications received by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create NOTIFICATIONS_TOTAL metric - this should never happen")
});

static NOTIFICATIONS_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_notifications_skipped_total",
        "Total number of updates skipped because the resourceVersion did not change",
    )
    .expect("Failed to create NOTIFICATIONS_SKIPPED_TOTAL metric - this should never happen")
});

static TRANSLATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "replica_controller_translation_errors_total",
        "Total number of notifications dropped because the payload was invalid",
    )
    .expect("Failed to create TRANSLATION_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails when called twice, which main never does"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SCALE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_ADDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRANSLATION_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_scale_operations() {
    SCALE_OPERATIONS_TOTAL.inc();
}

pub fn increment_queue_adds() {
    QUEUE_ADDS_TOTAL.inc();
}

pub fn increment_queue_retries() {
    QUEUE_RETRIES_TOTAL.inc();
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "Queue depth never approaches i64::MAX"
)]
pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as i64);
}

pub fn increment_notifications(kind: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_notifications_skipped() {
    NOTIFICATIONS_SKIPPED_TOTAL.inc();
}

pub fn increment_translation_errors() {
    TRANSLATION_ERRORS_TOTAL.inc();
}
