use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "bookd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "bookd_query_duration_seconds";

/// Counter: scheduling operations by outcome. Labels: op, outcome.
pub const OPERATIONS_TOTAL: &str = "bookd_operations_total";

/// Counter: coordinator retries after a transient failure. Labels: op.
pub const RETRIES_TOTAL: &str = "bookd_retries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a resource's critical section.
pub const LOCK_WAIT_SECONDS: &str = "bookd_lock_wait_seconds";

/// Counter: lock waits that gave up.
pub const LOCK_TIMEOUTS_TOTAL: &str = "bookd_lock_timeouts_total";

pub const CONNECTIONS_ACTIVE: &str = "bookd_connections_active";
pub const CONNECTIONS_TOTAL: &str = "bookd_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "bookd_connections_rejected_total";

/// Gauge: loaded tenant engines.
pub const TENANTS_ACTIVE: &str = "bookd_tenants_active";

pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
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
        Command::RegisterService { .. } => "register_service",
        Command::UpdateService { .. } => "update_service",
        Command::DeactivateService { .. } => "deactivate_service",
        Command::ListServices => "list_services",
        Command::CreateAppointment { .. } => "create_appointment",
        Command::RescheduleAppointment { .. } => "reschedule_appointment",
        Command::TransitionAppointment { .. } => "transition_appointment",
        Command::GetAppointment { .. } => "get_appointment",
        Command::ListAppointments { .. } => "list_appointments",
        Command::FreeSlots { .. } => "free_slots",
        Command::CheckSlot { .. } => "check_slot",
    }
}
