use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotwise_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotwise_query_duration_seconds";

// ── Scheduling outcomes ─────────────────────────────────────────

/// Counter: appointments created.
pub const APPOINTMENTS_CREATED_TOTAL: &str = "slotwise_appointments_created_total";

/// Counter: appointments moved to a new date/time.
pub const APPOINTMENTS_RESCHEDULED_TOTAL: &str = "slotwise_appointments_rescheduled_total";

/// Counter: bookings or reschedules rejected for overlapping an active appointment.
pub const SLOT_CONFLICTS_TOTAL: &str = "slotwise_slot_conflicts_total";

/// Counter: status transitions. Labels: status (the target status).
pub const STATUS_TRANSITIONS_TOTAL: &str = "slotwise_status_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotwise_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotwise_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotwise_connections_rejected_total";

/// Gauge: number of active tenants (loaded stores).
pub const TENANTS_ACTIVE: &str = "slotwise_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (transactions per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
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
        Command::InsertRule(_) => "insert_rule",
        Command::DeleteRule { .. } => "delete_rule",
        Command::InsertWorkingHours(_) => "insert_working_hours",
        Command::InsertSpecialHours(_) => "insert_special_hours",
        Command::DeleteShopHours { .. } => "delete_shop_hours",
        Command::InsertService(_) => "insert_service",
        Command::InsertAppointment(_) => "insert_appointment",
        Command::ChangeStatus { .. } => "change_status",
        Command::Reschedule { .. } => "reschedule",
        Command::SetNotes { .. } => "set_notes",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::SelectSlots(_) => "select_slots",
        Command::SelectAvailability(_) => "select_availability",
        Command::SelectAppointment { .. } => "select_appointment",
        Command::SelectDayAppointments { .. } => "select_day_appointments",
    }
}
