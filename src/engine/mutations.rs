use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::catalog::validate_service;
use super::{Engine, EngineError, WalCommand};

/// Partial update of a catalog entry. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub duration_minutes: Option<u32>,
    pub price_cents: Option<u64>,
}

impl Engine {
    pub async fn register_service(
        &self,
        id: Ulid,
        name: String,
        duration_minutes: u32,
        price_cents: u64,
    ) -> Result<Service, EngineError> {
        validate_service(&name, duration_minutes, price_cents)?;
        let _gate = self.commit_gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        if self.services.contains(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.services.len() >= MAX_SERVICES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many services"));
        }

        let event = Event::ServiceRegistered {
            id,
            name,
            duration_minutes,
            price_cents,
        };
        self.persist_catalog(&event).await?;
        tracing::info!("registered service {id} ({duration_minutes} min)");
        self.get_service(id)
    }

    /// Edit a service. Existing appointments keep the interval they were
    /// booked with; only later bookings and reschedules see the new duration.
    pub async fn update_service(&self, id: Ulid, update: ServiceUpdate) -> Result<Service, EngineError> {
        let _gate = self.commit_gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        let current = self.get_service(id)?;

        let name = update.name.unwrap_or(current.name);
        let duration_minutes = update.duration_minutes.unwrap_or(current.duration_minutes);
        let price_cents = update.price_cents.unwrap_or(current.price_cents);
        validate_service(&name, duration_minutes, price_cents)?;

        let event = Event::ServiceUpdated {
            id,
            name,
            duration_minutes,
            price_cents,
        };
        self.persist_catalog(&event).await?;
        self.get_service(id)
    }

    /// Soft delete: the service stays resolvable for history but can no
    /// longer be booked.
    pub async fn deactivate_service(&self, id: Ulid) -> Result<Service, EngineError> {
        let _gate = self.commit_gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        let current = self.get_service(id)?;
        if !current.active {
            return Ok(current);
        }

        self.persist_catalog(&Event::ServiceDeactivated { id }).await?;
        tracing::info!("deactivated service {id}");
        self.get_service(id)
    }

    /// Rewrite the WAL as the minimal event list that recreates current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive gate: no mutation is between its WAL append and its apply.
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        for service in self.services.list() {
            events.push(Event::ServiceRegistered {
                id: service.id,
                name: service.name,
                duration_minutes: service.duration_minutes,
                price_cents: service.price_cents,
            });
            if !service.active {
                events.push(Event::ServiceDeactivated { id: service.id });
            }
        }

        let calendars: Vec<_> = self.calendars.iter().map(|e| e.value().clone()).collect();
        for cal in calendars {
            let guard = cal.read().await;
            for a in &guard.appointments {
                events.push(Event::AppointmentCreated {
                    id: a.id,
                    resource_id: a.resource_id,
                    service_id: a.service_id,
                    customer_id: a.customer_id,
                    span: a.span,
                });
                if a.status != AppointmentStatus::Scheduled {
                    events.push(Event::AppointmentStatusChanged {
                        id: a.id,
                        resource_id: a.resource_id,
                        status: a.status,
                    });
                }
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
