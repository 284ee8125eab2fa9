use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{check_availability, AppointmentIndex, Availability};
use super::EngineError;

/// Both ends must fall inside the supported timestamp range.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Only live appointments count toward the per-resource cap. Cancelled and
/// completed history never blocks a new booking.
pub(crate) fn ensure_capacity(cal: &ResourceCalendar) -> Result<(), EngineError> {
    if cal.active_count() >= MAX_APPOINTMENTS_PER_RESOURCE {
        return Err(EngineError::LimitExceeded("too many appointments on resource"));
    }
    Ok(())
}

/// Candidate span for a booking starting at `start` with a snapshotted duration.
pub(crate) fn candidate_span(start: Ms, duration_minutes: u32) -> Result<Span, EngineError> {
    let span = Span::starting_at(start, duration_minutes)?;
    validate_span(&span)?;
    Ok(span)
}

/// Turn a checker verdict into the error the caller sees.
pub(crate) fn ensure_available<I: AppointmentIndex + ?Sized>(
    index: &I,
    span: &Span,
    excluding: Option<Ulid>,
) -> Result<(), EngineError> {
    match check_availability(index, span, excluding) {
        Availability::Available => Ok(()),
        Availability::Conflicting(existing) => {
            tracing::debug!(
                "slot {span} conflicts with appointment {} at {}",
                existing.id,
                existing.span
            );
            Err(EngineError::SlotConflict {
                appointment_id: existing.id,
                span: existing.span,
            })
        }
    }
}
