use ulid::Ulid;

use crate::model::*;

use super::availability::{check_availability, free_slots, Availability};
use super::catalog::ServiceCatalog;
use super::conflict::{candidate_span, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let resource_id = self
            .resource_for_appointment(&id)
            .ok_or(EngineError::AppointmentNotFound(id))?;
        let cal = self
            .get_calendar(&resource_id)
            .ok_or(EngineError::AppointmentNotFound(id))?;
        let guard = cal.read().await;
        guard.get(id).cloned().ok_or(EngineError::AppointmentNotFound(id))
    }

    /// Every appointment (any status) overlapping `window`, ordered by start.
    pub async fn list_appointments(
        &self,
        resource_id: Ulid,
        window: Span,
    ) -> Result<Vec<Appointment>, EngineError> {
        validate_window(&window)?;
        let Some(cal) = self.get_calendar(&resource_id) else {
            return Ok(vec![]);
        };
        let guard = cal.read().await;
        Ok(guard.overlapping(window).cloned().collect())
    }

    /// Gaps in `window` where `service_id` would fit on the resource.
    pub async fn find_free_slots(
        &self,
        resource_id: Ulid,
        service_id: Ulid,
        window: Span,
    ) -> Result<Vec<Span>, EngineError> {
        validate_window(&window)?;
        let min = Ms::from(self.services.resolve_duration(service_id)?) * MINUTE_MS;
        match self.get_calendar(&resource_id) {
            Some(cal) => {
                let guard = cal.read().await;
                Ok(free_slots(&*guard, &window, min))
            }
            None if window.duration_ms() >= min => Ok(vec![window]),
            None => Ok(vec![]),
        }
    }

    /// Read-only pre-check of a booking. The verdict may be stale by the time
    /// the booking is attempted; only `create_appointment` is authoritative.
    pub async fn check_slot(
        &self,
        resource_id: Ulid,
        service_id: Ulid,
        start: Ms,
    ) -> Result<Availability, EngineError> {
        let duration = self.services.resolve_duration(service_id)?;
        let span = candidate_span(start, duration)?;
        match self.get_calendar(&resource_id) {
            Some(cal) => {
                let guard = cal.read().await;
                Ok(check_availability(&*guard, &span, None))
            }
            None => Ok(Availability::Available),
        }
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.services.list()
    }

    pub fn get_service(&self, id: Ulid) -> Result<Service, EngineError> {
        self.services.get(&id).ok_or(EngineError::ServiceNotFound(id))
    }
}
