//! Appointment state machine. Every function here runs inside the resource's
//! critical section; `coordinator` decides how callers get in.

use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::model::*;

use super::catalog::ServiceCatalog;
use super::conflict::{candidate_span, ensure_available, ensure_capacity};
use super::{Engine, EngineError};

impl Engine {
    pub(super) async fn create_locked(&self, req: BookingRequest) -> Result<Appointment, EngineError> {
        // Reserve the id first so two requests reusing it cannot both commit,
        // even when they target different resources.
        match self.appointment_to_resource.entry(req.id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(req.id)),
            Entry::Vacant(slot) => {
                slot.insert(req.resource_id);
            }
        }

        let result = self.create_reserved(req).await;
        if result.is_err() {
            self.appointment_to_resource.remove(&req.id);
        }
        result
    }

    async fn create_reserved(&self, req: BookingRequest) -> Result<Appointment, EngineError> {
        let cal = self.calendar_or_create(req.resource_id)?;
        let _gate = self.commit_gate.read().await;
        let mut guard = self.lock_calendar(req.resource_id, cal).await?;

        ensure_capacity(&guard)?;

        let duration = self.services.resolve_duration(req.service_id)?;
        let span = candidate_span(req.start, duration)?;
        ensure_available(&*guard, &span, None)?;

        let event = Event::AppointmentCreated {
            id: req.id,
            resource_id: req.resource_id,
            service_id: req.service_id,
            customer_id: req.customer_id,
            span,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        tracing::info!(
            "booked appointment {} on resource {} at {span} for customer {}",
            req.id,
            req.resource_id,
            req.customer_id
        );
        Ok(Appointment {
            id: req.id,
            resource_id: req.resource_id,
            service_id: req.service_id,
            customer_id: req.customer_id,
            span,
            status: AppointmentStatus::Scheduled,
        })
    }

    pub(super) async fn reschedule_locked(&self, id: Ulid, new_start: Ms) -> Result<Appointment, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (resource_id, mut guard) = self.lock_appointment(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::AppointmentNotFound(id))?;
        if current.status.apply(Transition::Reschedule).is_none() {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                action: Transition::Reschedule,
            });
        }

        // Fresh duration snapshot: the service may have changed since booking.
        let duration = self.services.resolve_duration(current.service_id)?;
        let span = candidate_span(new_start, duration)?;
        ensure_available(&*guard, &span, Some(id))?;

        let event = Event::AppointmentRescheduled { id, resource_id, span };
        self.persist_and_apply(&mut guard, &event).await?;

        tracing::info!("rescheduled appointment {id} from {} to {span}", current.span);
        Ok(Appointment { span, ..current })
    }

    /// Confirm, cancel or complete. None of these move the interval, so no
    /// availability check is needed.
    pub(super) async fn transition_locked(
        &self,
        id: Ulid,
        transition: Transition,
    ) -> Result<Appointment, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (resource_id, mut guard) = self.lock_appointment(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::AppointmentNotFound(id))?;
        let status = current
            .status
            .apply(transition)
            .ok_or(EngineError::InvalidTransition {
                id,
                from: current.status,
                action: transition,
            })?;

        let event = Event::AppointmentStatusChanged { id, resource_id, status };
        self.persist_and_apply(&mut guard, &event).await?;

        tracing::info!("appointment {id}: {} -> {status}", current.status);
        Ok(Appointment { status, ..current })
    }
}
