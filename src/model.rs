use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    /// Unchecked constructor for spans already known to be well formed.
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Span of `minutes` starting at `start`.
    pub fn starting_at(start: Ms, minutes: u32) -> Result<Self, EngineError> {
        let end = (minutes as Ms)
            .checked_mul(MINUTE_MS)
            .and_then(|len| start.checked_add(len))
            .ok_or(EngineError::InvalidInterval { start, end: Ms::MAX })?;
        Self::try_new(start, end)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Whole minutes covered by the span, rounded down.
    pub fn duration_minutes(&self) -> Ms {
        self.duration_ms() / MINUTE_MS
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A bookable offering from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_minutes: u32,
    pub price_cents: u64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

/// A requested lifecycle move. Reschedule keeps the status but is only
/// legal while the appointment still occupies its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Reschedule,
    Confirm,
    Cancel,
    Complete,
}

impl AppointmentStatus {
    /// Scheduled and confirmed appointments occupy their interval.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Status after applying `transition`, or `None` if the move is illegal.
    pub fn apply(self, transition: Transition) -> Option<Self> {
        use AppointmentStatus::*;
        match (self, transition) {
            (Scheduled | Confirmed, Transition::Reschedule) => Some(self),
            (Scheduled, Transition::Confirm) => Some(Confirmed),
            (Scheduled | Confirmed, Transition::Cancel) => Some(Cancelled),
            (Confirmed, Transition::Complete) => Some(Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transition::Reschedule => "reschedule",
            Transition::Confirm => "confirm",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub service_id: Ulid,
    pub customer_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
}

/// Typed input for `create_appointment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub service_id: Ulid,
    pub customer_id: Ulid,
    pub start: Ms,
}

impl BookingRequest {
    /// Request with a freshly generated appointment id.
    pub fn new(resource_id: Ulid, service_id: Ulid, customer_id: Ulid, start: Ms) -> Self {
        Self {
            id: Ulid::new(),
            resource_id,
            service_id,
            customer_id,
            start,
        }
    }
}

/// Every appointment ever booked on one resource, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct ResourceCalendar {
    pub id: Ulid,
    pub appointments: Vec<Appointment>,
}

impl ResourceCalendar {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            appointments: Vec::new(),
        }
    }

    /// Insert appointment maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.span.start <= appointment.span.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn set_status(&mut self, id: Ulid, status: AppointmentStatus) -> bool {
        match self.appointments.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.status = status;
                true
            }
            None => false,
        }
    }

    /// Move an appointment to a new span, keeping the list sorted.
    pub fn move_to(&mut self, id: Ulid, span: Span) -> bool {
        match self.remove(id) {
            Some(mut a) => {
                a.span = span;
                self.insert(a);
                true
            }
            None => false,
        }
    }

    /// Appointments (any status) whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    pub fn active_count(&self) -> usize {
        self.appointments.iter().filter(|a| a.status.is_active()).count()
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceRegistered {
        id: Ulid,
        name: String,
        duration_minutes: u32,
        price_cents: u64,
    },
    ServiceUpdated {
        id: Ulid,
        name: String,
        duration_minutes: u32,
        price_cents: u64,
    },
    ServiceDeactivated {
        id: Ulid,
    },
    AppointmentCreated {
        id: Ulid,
        resource_id: Ulid,
        service_id: Ulid,
        customer_id: Ulid,
        span: Span,
    },
    AppointmentRescheduled {
        id: Ulid,
        resource_id: Ulid,
        span: Span,
    },
    AppointmentStatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: AppointmentStatus,
    },
}

impl Event {
    /// Resource whose calendar the event mutates; `None` for catalog events.
    pub fn resource_id(&self) -> Option<Ulid> {
        match self {
            Event::AppointmentCreated { resource_id, .. }
            | Event::AppointmentRescheduled { resource_id, .. }
            | Event::AppointmentStatusChanged { resource_id, .. } => Some(*resource_id),
            Event::ServiceRegistered { .. }
            | Event::ServiceUpdated { .. }
            | Event::ServiceDeactivated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appt(start: Ms, end: Ms, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            resource_id: Ulid::nil(),
            service_id: Ulid::nil(),
            customer_id: Ulid::nil(),
            span: Span::new(start, end),
            status,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(0, 30 * MINUTE_MS);
        assert_eq!(s.duration_ms(), 1_800_000);
        assert_eq!(s.duration_minutes(), 30);
        assert!(s.contains(0));
        assert!(s.contains(30 * MINUTE_MS - 1));
        assert!(!s.contains(30 * MINUTE_MS)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(matches!(
            Span::try_new(100, 100),
            Err(EngineError::InvalidInterval { start: 100, end: 100 })
        ));
        assert!(Span::try_new(200, 100).is_err());
        assert_eq!(Span::try_new(100, 101).unwrap(), Span::new(100, 101));
    }

    #[test]
    fn span_starting_at_computes_end() {
        let s = Span::starting_at(1_000, 45).unwrap();
        assert_eq!(s.end, 1_000 + 45 * MINUTE_MS);
        assert!(Span::starting_at(0, 0).is_err());
        assert!(Span::starting_at(Ms::MAX - 1, 1).is_err());
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(100, 400);
        assert!(outer.contains_span(&Span::new(150, 300)));
        assert!(outer.contains_span(&outer));
        assert!(!outer.contains_span(&Span::new(50, 200)));
    }

    #[test]
    fn lifecycle_forward_moves() {
        use AppointmentStatus::*;
        assert_eq!(Scheduled.apply(Transition::Confirm), Some(Confirmed));
        assert_eq!(Scheduled.apply(Transition::Cancel), Some(Cancelled));
        assert_eq!(Confirmed.apply(Transition::Cancel), Some(Cancelled));
        assert_eq!(Confirmed.apply(Transition::Complete), Some(Completed));
        assert_eq!(Confirmed.apply(Transition::Reschedule), Some(Confirmed));
        // confirmation is a required gate before completion
        assert_eq!(Scheduled.apply(Transition::Complete), None);
        assert_eq!(Confirmed.apply(Transition::Confirm), None);
    }

    #[test]
    fn lifecycle_terminal_states_are_closed() {
        for status in [AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
            for t in [
                Transition::Reschedule,
                Transition::Confirm,
                Transition::Cancel,
                Transition::Complete,
            ] {
                assert_eq!(status.apply(t), None, "{status} -> {t}");
            }
        }
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
        ] {
            assert_eq!(AppointmentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(AppointmentStatus::parse("CANCELED"), Some(AppointmentStatus::Cancelled));
        assert_eq!(AppointmentStatus::parse("pending"), None);
    }

    #[test]
    fn calendar_keeps_start_order() {
        let mut cal = ResourceCalendar::new(Ulid::new());
        cal.insert(appt(300, 400, AppointmentStatus::Scheduled));
        cal.insert(appt(100, 200, AppointmentStatus::Confirmed));
        cal.insert(appt(200, 300, AppointmentStatus::Cancelled));
        let starts: Vec<Ms> = cal.appointments.iter().map(|a| a.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
        assert_eq!(cal.active_count(), 2);
    }

    #[test]
    fn calendar_move_to_resorts() {
        let mut cal = ResourceCalendar::new(Ulid::new());
        let first = appt(100, 200, AppointmentStatus::Scheduled);
        let id = first.id;
        cal.insert(first);
        cal.insert(appt(300, 400, AppointmentStatus::Scheduled));

        assert!(cal.move_to(id, Span::new(500, 600)));
        assert_eq!(cal.appointments[1].id, id);
        assert_eq!(cal.appointments[1].span, Span::new(500, 600));
        assert!(!cal.move_to(Ulid::new(), Span::new(0, 1)));
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut cal = ResourceCalendar::new(Ulid::new());
        cal.insert(appt(100, 200, AppointmentStatus::Scheduled));
        cal.insert(appt(450, 600, AppointmentStatus::Scheduled));
        cal.insert(appt(1000, 1100, AppointmentStatus::Scheduled));

        let hits: Vec<_> = cal.overlapping(Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut cal = ResourceCalendar::new(Ulid::new());
        cal.insert(appt(100, 200, AppointmentStatus::Scheduled));
        assert_eq!(cal.overlapping(Span::new(200, 300)).count(), 0);
        assert_eq!(cal.overlapping(Span::new(0, 100)).count(), 0);
        assert_eq!(cal.overlapping(Span::new(199, 300)).count(), 1);
    }

    #[test]
    fn event_resource_id() {
        let rid = Ulid::new();
        let e = Event::AppointmentStatusChanged {
            id: Ulid::new(),
            resource_id: rid,
            status: AppointmentStatus::Confirmed,
        };
        assert_eq!(e.resource_id(), Some(rid));
        assert_eq!(Event::ServiceDeactivated { id: rid }.resource_id(), None);
    }
}
