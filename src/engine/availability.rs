use ulid::Ulid;

use crate::model::*;

/// Read access to the appointments occupying a resource's time line.
///
/// The checker only needs "which active appointments overlap this window".
/// `ResourceCalendar` answers with a sorted-vec scan; an interval tree could
/// implement the same trait without touching callers.
pub trait AppointmentIndex {
    /// Scheduled/confirmed appointments whose span overlaps `query`.
    fn active_overlapping(&self, query: Span) -> impl Iterator<Item = &Appointment>;
}

impl AppointmentIndex for ResourceCalendar {
    fn active_overlapping(&self, query: Span) -> impl Iterator<Item = &Appointment> {
        self.overlapping(query)
            .filter(move |a| a.status.is_active() && a.span.overlaps(&query))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Conflicting(Appointment),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Decide whether `candidate` is free on the calendar.
///
/// Returns the earliest-starting active appointment overlapping the candidate,
/// ignoring `excluding` (an appointment never conflicts with itself while
/// being rescheduled). Adjacent appointments never conflict.
pub fn check_availability<I: AppointmentIndex + ?Sized>(
    index: &I,
    candidate: &Span,
    excluding: Option<Ulid>,
) -> Availability {
    index
        .active_overlapping(*candidate)
        .filter(|a| Some(a.id) != excluding)
        .min_by_key(|a| (a.span.start, a.id))
        .map_or(Availability::Available, |a| Availability::Conflicting(a.clone()))
}

/// Free gaps inside `window` that are at least `min_duration` long.
pub fn free_slots<I: AppointmentIndex + ?Sized>(index: &I, window: &Span, min_duration: Ms) -> Vec<Span> {
    let mut busy: Vec<Span> = index
        .active_overlapping(*window)
        .map(|a| Span::new(a.span.start.max(window.start), a.span.end.min(window.end)))
        .collect();
    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);

    let mut free = subtract_intervals(&[*window], &busy);
    free.retain(|s| s.duration_ms() >= min_duration);
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove every `to_remove` span from `base`. Both inputs sorted and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}
