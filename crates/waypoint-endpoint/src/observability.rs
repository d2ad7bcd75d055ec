//! Endpoint map metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

/// Gauge: size of the current endpoint set, labelled by `service`.
pub const ENDPOINTS_SIZE: &str = "waypoint_endpoints_size";

/// Record the endpoint count after a successful update.
pub(crate) fn record_endpoint_count(service: &str, count: usize) {
    metrics::gauge!(ENDPOINTS_SIZE, "service" => service.to_string()).set(count as f64);
}
