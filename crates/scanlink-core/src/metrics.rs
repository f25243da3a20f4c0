//! Metrics instrumentation for Scanlink.
//!
//! Recorded through the `metrics` facade; the server installs the exporter.

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "scanlink_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "scanlink_sessions_active";
    pub const SCANS_TOTAL: &str = "scanlink_scans_total";
    pub const DELIVERIES_TOTAL: &str = "scanlink_deliveries_total";
    pub const DELIVERY_BYTES: &str = "scanlink_delivery_bytes";
    pub const EVICTIONS_TOTAL: &str = "scanlink_evictions_total";
    pub const BROADCAST_SECONDS: &str = "scanlink_broadcast_seconds";
    pub const LIVENESS_TICKS_TOTAL: &str = "scanlink_liveness_ticks_total";
    pub const ERRORS_TOTAL: &str = "scanlink_errors_total";
}

/// Record a new session.
pub fn record_session_opened() {
    counter!(names::SESSIONS_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

/// Record a session going away.
pub fn record_session_closed() {
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a scan handed to the broadcaster.
pub fn record_scan() {
    counter!(names::SCANS_TOTAL).increment(1);
}

/// Record the outcome of one per-session delivery.
pub fn record_delivery(bytes: usize, ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!(names::DELIVERIES_TOTAL, "result" => result).increment(1);
    if ok {
        counter!(names::DELIVERY_BYTES).increment(bytes as u64);
    }
}

/// Record an eviction after a failed send.
pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

/// Record how long a full fan-out took.
pub fn record_broadcast_latency(seconds: f64) {
    histogram!(names::BROADCAST_SECONDS).record(seconds);
}

/// Record a liveness tick.
pub fn record_liveness_tick() {
    counter!(names::LIVENESS_TICKS_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
