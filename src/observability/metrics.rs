//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mux_requests_total` (counter): requests by outcome (matched, not_found, panic)
//! - `muxd_busy` (gauge): 1 while any request is in flight, else 0
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter on `addr` and describe known metrics.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(
        "mux_requests_total",
        "Requests served by the mux, labelled by outcome"
    );
    metrics::describe_gauge!("muxd_busy", "1 while any request is in flight");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}
