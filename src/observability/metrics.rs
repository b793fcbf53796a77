//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `source_controller_reconciliations_total` - Total number of reconciliations
//! - `source_controller_reconciliation_errors_total` - Total number of reconciliation errors
//! - `source_controller_reconcile_duration_seconds` - Duration of reconciliation operations
//! - `source_controller_artifact_downloads_total` - Total number of remote downloads
//! - `source_controller_artifact_download_errors_total` - Total number of failed remote downloads
//! - `source_controller_requeues_total` - Requeues by trigger (timer, error-backoff)

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "source_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("metric definition is valid")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "source_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("metric definition is valid")
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "source_controller_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric definition is valid")
});

static ARTIFACT_DOWNLOADS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "source_controller_artifact_downloads_total",
        "Total number of remote downloads",
    )
    .expect("metric definition is valid")
});

static ARTIFACT_DOWNLOAD_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "source_controller_artifact_download_errors_total",
        "Total number of failed remote downloads",
    )
    .expect("metric definition is valid")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "source_controller_requeues_total",
            "Total number of requeues by trigger",
        ),
        &["trigger"],
    )
    .expect("metric definition is valid")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_DOWNLOADS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_DOWNLOAD_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconcile_duration(duration: f64) {
    RECONCILE_DURATION.observe(duration);
}

pub fn increment_artifact_downloads() {
    ARTIFACT_DOWNLOADS_TOTAL.inc();
}

pub fn increment_artifact_download_errors() {
    ARTIFACT_DOWNLOAD_ERRORS_TOTAL.inc();
}

pub fn increment_requeues(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}
