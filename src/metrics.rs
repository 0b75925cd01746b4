//! Prometheus metrics for the request gates.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `coffee_admission_rejected_total` - Requests throttled by admission control
//! - `coffee_admission_evicted_total` - Idle client records removed by the sweeper
//! - `coffee_auth_rejected_total` - Requests stopped by an auth stage (labels: stage, reason)
//! - `coffee_panics_total` - Handler panics contained by the outermost stage
//!
//! ## Gauges
//! - `coffee_admission_tracked_clients` - Client records currently held by the limiter
//!
//! # Usage
//!
//! ```rust,ignore
//! use coffee_api::metrics::{init_metrics, record_admission_rejected};
//!
//! init_metrics(addr)?;
//! record_admission_rejected();
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const ADMISSION_REJECTED_TOTAL: &str = "coffee_admission_rejected_total";
    pub const ADMISSION_EVICTED_TOTAL: &str = "coffee_admission_evicted_total";
    pub const ADMISSION_TRACKED_CLIENTS: &str = "coffee_admission_tracked_clients";
    pub const AUTH_REJECTED_TOTAL: &str = "coffee_auth_rejected_total";
    pub const PANICS_TOTAL: &str = "coffee_panics_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::ADMISSION_REJECTED_TOTAL,
        "Total number of requests throttled by admission control"
    );
    describe_counter!(
        names::ADMISSION_EVICTED_TOTAL,
        "Total number of idle client records evicted"
    );
    describe_counter!(
        names::AUTH_REJECTED_TOTAL,
        "Total number of requests rejected by authentication or role checks"
    );
    describe_counter!(
        names::PANICS_TOTAL,
        "Total number of handler panics converted to 500 responses"
    );
    describe_gauge!(
        names::ADMISSION_TRACKED_CLIENTS,
        "Client records currently held by the admission limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a throttled request.
pub fn record_admission_rejected() {
    counter!(names::ADMISSION_REJECTED_TOTAL).increment(1);
}

/// Record one sweep's evictions and the surviving record count.
pub fn record_admission_sweep(evicted: usize, remaining: usize) {
    counter!(names::ADMISSION_EVICTED_TOTAL).increment(evicted as u64);
    gauge!(names::ADMISSION_TRACKED_CLIENTS).set(remaining as f64);
}

/// Record a request stopped by an auth stage.
pub fn record_auth_rejected(stage: &'static str, reason: &'static str) {
    counter!(names::AUTH_REJECTED_TOTAL, "stage" => stage, "reason" => reason).increment(1);
}

/// Record a contained panic.
pub fn record_panic() {
    counter!(names::PANICS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder must be a no-op.

    #[test]
    fn test_record_without_recorder() {
        record_admission_rejected();
        record_admission_sweep(3, 10);
        record_auth_rejected("authenticate", "invalid_token");
        record_panic();
    }
}
