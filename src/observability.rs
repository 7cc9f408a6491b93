use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "baybook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "baybook_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "baybook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "baybook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "baybook_connections_rejected_total";

/// Histogram: time spent rewriting the active reservation set, in seconds.
pub const STORE_WRITE_DURATION_SECONDS: &str = "baybook_store_write_duration_seconds";

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: bookings accepted by the validator.
pub const BOOKINGS_ADMITTED_TOTAL: &str = "baybook_bookings_admitted_total";

/// Counter: bookings refused by the validator. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "baybook_bookings_rejected_total";

/// Counter: reservations moved to the archive. Labels: reason.
pub const RESERVATIONS_ARCHIVED_TOTAL: &str = "baybook_reservations_archived_total";

/// Counter: customer notifications that could not be delivered.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "baybook_notifications_failed_total";

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

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectServices => "select_services",
        Command::InsertService(_) => "insert_service",
        Command::UpdateServicePrice { .. } => "update_service_price",
        Command::DeleteService { .. } => "delete_service",
        Command::SelectSlots { .. } => "select_slots",
        Command::InsertReservation(_) => "insert_reservation",
        Command::InsertManualReservation(_) => "insert_manual_reservation",
        Command::UpdateReservationStatus { .. } => "update_reservation_status",
        Command::SelectReservations => "select_reservations",
        Command::SelectArchive => "select_archive",
        Command::SelectDashboard => "select_dashboard",
    }
}
