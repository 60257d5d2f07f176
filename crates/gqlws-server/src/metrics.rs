//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections upgraded (counter).
pub const CONNECTIONS_TOTAL: &str = "gqlws_connections_total";
/// Connections currently open (gauge).
pub const CONNECTIONS_ACTIVE: &str = "gqlws_connections_active";
/// Connection lifetime (histogram, seconds).
pub const CONNECTION_DURATION_SECONDS: &str = "gqlws_connection_duration_seconds";
/// Operations accepted (counter).
pub const OPERATIONS_STARTED_TOTAL: &str = "gqlws_operations_started_total";
/// Operations currently forwarding results (gauge).
pub const OPERATIONS_ACTIVE: &str = "gqlws_operations_active";
/// `start` frames answered with `error`/`connection_error` (counter, labels: reason).
pub const OPERATION_ERRORS_TOTAL: &str = "gqlws_operation_errors_total";
/// Frames written to clients (counter, labels: type).
pub const FRAMES_SENT_TOTAL: &str = "gqlws_frames_sent_total";
