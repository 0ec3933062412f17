//! # Metrics Collection
//!
//! Prometheus metrics for snapshot publication, mutations and HTTP traffic.
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::ObservabilityConfig;
use crate::errors::{MagplaneError, Result};
use crate::storage::ConfigStore;
use crate::xds::SnapshotVersion;

/// Metrics recorder that tracks control plane metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    fn describe(&self) {
        describe_counter!("snapshots_published_total", "Snapshots accepted by the discovery cache");
        describe_counter!(
            "snapshot_publish_failures_total",
            "Snapshots discarded, labelled by reason"
        );
        describe_counter!(
            "control_plane_mutations_total",
            "Mutation requests, labelled by operation and outcome"
        );
        describe_gauge!("snapshot_version_counter", "Counter part of the last published version");
        describe_gauge!("snapshot_version_epoch", "Epoch part of the last published version");
        describe_gauge!("config_objects_total", "Objects in the configuration store");
        describe_counter!("http_requests_total", "Management API requests");
        describe_histogram!("http_request_duration_seconds", "Management API latency");
    }

    pub fn record_snapshot_published(&self, version: SnapshotVersion, store: &ConfigStore) {
        counter!("snapshots_published_total").increment(1);
        gauge!("snapshot_version_counter").set(version.counter() as f64);
        gauge!("snapshot_version_epoch").set(version.epoch() as f64);

        let endpoints: usize = store.clusters().iter().map(|c| c.endpoints.len()).sum();
        gauge!("config_objects_total", "resource_type" => "listener")
            .set(store.listener_count() as f64);
        gauge!("config_objects_total", "resource_type" => "cluster")
            .set(store.cluster_count() as f64);
        gauge!("config_objects_total", "resource_type" => "endpoint").set(endpoints as f64);
    }

    pub fn record_publish_failure(&self, reason: &str) {
        let labels = [("reason", reason.to_string())];
        counter!("snapshot_publish_failures_total", &labels).increment(1);
    }

    pub fn record_mutation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("control_plane_mutations_total", &labels).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status", status.to_string()),
        ];
        counter!("http_requests_total", &labels).increment(1);

        let duration_labels = [("method", method.to_string()), ("path", path.to_string())];
        histogram!("http_request_duration_seconds", &duration_labels).record(duration);
    }
}

static METRICS: OnceCell<MetricsRecorder> = OnceCell::new();

/// Install the Prometheus exporter when a metrics port is configured.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            info!("Metrics exporter disabled");
            return Ok(());
        }
    };

    if METRICS.get().is_some() {
        warn!("Metrics exporter already installed");
        return Ok(());
    }

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        MagplaneError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            MagplaneError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    let recorder = METRICS.get_or_init(MetricsRecorder::new);
    recorder.describe();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics collection initialized");
    Ok(())
}

/// Get the global metrics recorder
pub fn get_metrics() -> Option<&'static MetricsRecorder> {
    METRICS.get()
}

pub fn record_snapshot_published(version: SnapshotVersion, store: &ConfigStore) {
    if let Some(metrics) = get_metrics() {
        metrics.record_snapshot_published(version, store);
    }
}

pub fn record_publish_failure(reason: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_publish_failure(reason);
    }
}

pub fn record_mutation(operation: &str, success: bool) {
    if let Some(metrics) = get_metrics() {
        metrics.record_mutation(operation, success);
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    if let Some(metrics) = get_metrics() {
        metrics.record_http_request(method, path, status, duration);
    }
}
