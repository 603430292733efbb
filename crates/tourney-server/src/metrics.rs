//! Metrics collection and export for the Tourney server.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tourney_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "tourney_connections_active";
    pub const EVENTS_TOTAL: &str = "tourney_events_total";
    pub const EVENTS_BYTES: &str = "tourney_events_bytes";
    pub const SNAPSHOT_WRITES_TOTAL: &str = "tourney_snapshot_writes_total";
    pub const WRITE_LATENCY_SECONDS: &str = "tourney_write_latency_seconds";
    pub const ERRORS_TOTAL: &str = "tourney_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of realtime connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of realtime connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of realtime events");
    metrics::describe_counter!(names::EVENTS_BYTES, "Total bytes of realtime events");
    metrics::describe_counter!(
        names::SNAPSHOT_WRITES_TOTAL,
        "Snapshot saves and resets accepted over HTTP"
    );
    metrics::describe_histogram!(
        names::WRITE_LATENCY_SECONDS,
        "Snapshot write handling latency in seconds"
    );
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

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a realtime event.
pub fn record_event(bytes: usize, direction: &'static str) {
    counter!(names::EVENTS_TOTAL, "direction" => direction).increment(1);
    counter!(names::EVENTS_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record an accepted snapshot write (`save` or `reset`).
pub fn record_snapshot_write(op: &'static str, seconds: f64) {
    counter!(names::SNAPSHOT_WRITES_TOTAL, "op" => op).increment(1);
    histogram!(names::WRITE_LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
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
        record_disconnection();
    }
}
