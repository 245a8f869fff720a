use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "slotbook_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "slotbook_request_duration_seconds";

/// Counter: bookings rejected because they overlap a committed appointment.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotbook_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotbook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a request to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::Ping => "ping",
        Request::CreateAppointment { .. } => "create_appointment",
        Request::UpdateAppointment { .. } => "update_appointment",
        Request::CancelAppointment { .. } => "cancel_appointment",
        Request::GetAppointment { .. } => "get_appointment",
        Request::ListAppointments => "list_appointments",
        Request::TotalPrice { .. } => "total_price",
        Request::CreateProduct { .. } => "create_product",
        Request::UpdateProduct { .. } => "update_product",
        Request::DeleteProduct { .. } => "delete_product",
        Request::GetProduct { .. } => "get_product",
        Request::ListProducts => "list_products",
    }
}
