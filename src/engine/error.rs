use thiserror::Error;
use ulid::Ulid;

use crate::model::{AppointmentStatus, Ms, Span, Transition};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid interval [{start}, {end})")]
    InvalidInterval { start: Ms, end: Ms },

    #[error("service not found: {0}")]
    ServiceNotFound(Ulid),

    #[error("service inactive: {0}")]
    ServiceInactive(Ulid),

    #[error("invalid service: {0}")]
    InvalidService(&'static str),

    #[error("slot conflicts with appointment {appointment_id} at {span}")]
    SlotConflict { appointment_id: Ulid, span: Span },

    #[error("cannot {action} appointment {id}: it is {from}")]
    InvalidTransition {
        id: Ulid,
        from: AppointmentStatus,
        action: Transition,
    },

    #[error("appointment not found: {0}")]
    AppointmentNotFound(Ulid),

    #[error("already exists: {0}")]
    AlreadyExists(Ulid),

    #[error("resource {0} is busy, retry the request")]
    ConcurrencyFailure(Ulid),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("WAL error: {0}")]
    WalError(String),

    #[error("booking task aborted: {0}")]
    Aborted(String),
}

impl EngineError {
    /// Transient failures the coordinator may retry on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyFailure(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::ServiceNotFound(_) => "service_not_found",
            EngineError::ServiceInactive(_) => "service_inactive",
            EngineError::InvalidService(_) => "invalid_service",
            EngineError::SlotConflict { .. } => "slot_conflict",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::AppointmentNotFound(_) => "appointment_not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::ConcurrencyFailure(_) => "concurrency_failure",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
            EngineError::Aborted(_) => "aborted",
        }
    }
}
