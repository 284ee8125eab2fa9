mod availability;
mod catalog;
mod conflict;
mod coordinator;
mod error;
mod lifecycle;
mod mutations;
mod queries;

pub use availability::{
    check_availability, free_slots, merge_overlapping, subtract_intervals, AppointmentIndex,
    Availability,
};
pub use catalog::{ServiceCatalog, ServiceRegistry};
pub use error::EngineError;
pub use mutations::ServiceUpdate;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<ResourceCalendar>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// pay for a single fsync and answer every sender in the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;

        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Flush what we have before compaction or stats see the log.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        flush_and_respond(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes never leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// One tenant's scheduling core: the service catalog, one calendar per
/// resource, and the WAL that makes both durable.
pub struct Engine {
    pub services: ServiceRegistry,
    pub(super) calendars: DashMap<Ulid, SharedCalendar>,
    /// Reverse lookup: appointment id → resource id.
    pub(super) appointment_to_resource: DashMap<Ulid, Ulid>,
    /// Serializes catalog writes against each other.
    pub(super) catalog_lock: Mutex<()>,
    /// Shared by every mutation, taken exclusively by compaction so the
    /// snapshot never misses an in-flight append.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) config: EngineConfig,
}

/// Apply an appointment event to its calendar (caller holds the lock).
fn apply_to_calendar(cal: &mut ResourceCalendar, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::AppointmentCreated {
            id,
            resource_id,
            service_id,
            customer_id,
            span,
        } => {
            cal.insert(Appointment {
                id: *id,
                resource_id: *resource_id,
                service_id: *service_id,
                customer_id: *customer_id,
                span: *span,
                status: AppointmentStatus::Scheduled,
            });
            index.insert(*id, *resource_id);
        }
        Event::AppointmentRescheduled { id, span, .. } => {
            cal.move_to(*id, *span);
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            cal.set_status(*id, *status);
        }
        // Catalog events never reach a calendar.
        Event::ServiceRegistered { .. }
        | Event::ServiceUpdated { .. }
        | Event::ServiceDeactivated { .. } => {}
    }
}

fn apply_to_catalog(services: &ServiceRegistry, event: &Event) {
    match event {
        Event::ServiceRegistered {
            id,
            name,
            duration_minutes,
            price_cents,
        }
        | Event::ServiceUpdated {
            id,
            name,
            duration_minutes,
            price_cents,
        } => {
            let active = services.get(id).is_none_or(|s| s.active);
            services.upsert(Service {
                id: *id,
                name: name.clone(),
                duration_minutes: *duration_minutes,
                price_cents: *price_cents,
                active,
            });
        }
        Event::ServiceDeactivated { id } => services.deactivate(id),
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            services: ServiceRegistry::new(),
            calendars: DashMap::new(),
            appointment_to_resource: DashMap::new(),
            catalog_lock: Mutex::new(()),
            commit_gate: RwLock::new(()),
            wal_tx,
            config,
        };

        // Replay — the engine is not shared yet, so every try_write succeeds
        // immediately. Never block here: this may run inside an async context.
        for event in &events {
            match event.resource_id() {
                None => apply_to_catalog(&engine.services, event),
                Some(resource_id) => {
                    let cal = engine
                        .calendars
                        .entry(resource_id)
                        .or_insert_with(|| Arc::new(RwLock::new(ResourceCalendar::new(resource_id))))
                        .clone();
                    let mut guard = cal
                        .try_write()
                        .map_err(|_| io::Error::other("replay: calendar unexpectedly locked"))?;
                    apply_to_calendar(&mut guard, event, &engine.appointment_to_resource);
                }
            }
        }

        tracing::debug!(
            "replayed {} events: {} services, {} calendars",
            events.len(),
            engine.services.len(),
            engine.calendars.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_calendar(&self, resource_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(resource_id).map(|e| e.value().clone())
    }

    pub fn resource_for_appointment(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_to_resource.get(appointment_id).map(|e| *e.value())
    }

    /// Calendars come into existence with their first booking.
    pub(super) fn calendar_or_create(&self, resource_id: Ulid) -> Result<SharedCalendar, EngineError> {
        if let Some(cal) = self.get_calendar(&resource_id) {
            return Ok(cal);
        }
        if self.calendars.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        Ok(self
            .calendars
            .entry(resource_id)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceCalendar::new(resource_id))))
            .clone())
    }

    /// Enter the resource's critical section, waiting at most `lock_timeout`.
    pub(super) async fn lock_calendar(
        &self,
        resource_id: Ulid,
        cal: SharedCalendar,
    ) -> Result<OwnedRwLockWriteGuard<ResourceCalendar>, EngineError> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.config.lock_timeout, cal.write_owned())
            .await
            .map_err(|_| {
                metrics::counter!(observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                EngineError::ConcurrencyFailure(resource_id)
            })?;
        metrics::histogram!(observability::LOCK_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(guard)
    }

    /// Lookup appointment → resource, then enter that resource's critical section.
    pub(super) async fn lock_appointment(
        &self,
        appointment_id: Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<ResourceCalendar>), EngineError> {
        let resource_id = self
            .resource_for_appointment(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let cal = self
            .get_calendar(&resource_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let guard = self.lock_calendar(resource_id, cal).await?;
        Ok((resource_id, guard))
    }

    /// WAL-append then apply. The in-memory calendar only changes once the
    /// event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        cal: &mut ResourceCalendar,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_calendar(cal, event, &self.appointment_to_resource);
        Ok(())
    }

    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_catalog(&self.services, event);
        Ok(())
    }
}
