//! Metrics export for Scanlink.
//!
//! The core crates record through the `metrics` facade; this module
//! describes those metrics and exports them in Prometheus format.

use metrics_exporter_prometheus::PrometheusBuilder;
use scanlink_core::metrics::{names, record_session_closed, record_session_opened};
use std::net::SocketAddr;
use tracing::info;

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of sessions since server start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of open sessions");
    metrics::describe_counter!(names::SCANS_TOTAL, "Total number of scans broadcast");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Per-session delivery attempts, labelled by outcome"
    );
    metrics::describe_counter!(names::DELIVERY_BYTES, "Total bytes delivered to sessions");
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Sessions evicted after a failed send"
    );
    metrics::describe_histogram!(
        names::BROADCAST_SECONDS,
        "Time to fan one scan out to every session"
    );
    metrics::describe_counter!(names::LIVENESS_TICKS_TOTAL, "Liveness ticks delivered");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Metrics guard that records a session close on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a session open.
    #[must_use]
    pub fn new() -> Self {
        record_session_opened();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_session_closed();
    }
}
