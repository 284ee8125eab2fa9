use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::*;
use crate::model::Service;

use super::EngineError;

/// Duration lookup the scheduling core needs from the catalog.
///
/// Implementations must be cheap and side-effect free; the core calls this once
/// per booking attempt and keeps the result as a snapshot.
pub trait ServiceCatalog {
    fn resolve_duration(&self, service_id: Ulid) -> Result<u32, EngineError>;
}

/// In-memory catalog rebuilt from the WAL on startup.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<Ulid, Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.services.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub(super) fn upsert(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub(super) fn deactivate(&self, id: &Ulid) {
        if let Some(mut s) = self.services.get_mut(id) {
            s.active = false;
        }
    }

    /// All services sorted by id (ULIDs sort by creation time).
    pub fn list(&self) -> Vec<Service> {
        let mut out: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|s| s.id);
        out
    }
}

impl ServiceCatalog for ServiceRegistry {
    fn resolve_duration(&self, service_id: Ulid) -> Result<u32, EngineError> {
        let service = self
            .services
            .get(&service_id)
            .ok_or(EngineError::ServiceNotFound(service_id))?;
        if !service.active {
            return Err(EngineError::ServiceInactive(service_id));
        }
        Ok(service.duration_minutes)
    }
}

pub(crate) fn validate_service(name: &str, duration_minutes: u32, price_cents: u64) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidService("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("service name too long"));
    }
    if duration_minutes == 0 {
        return Err(EngineError::InvalidService("duration must be positive"));
    }
    if duration_minutes > MAX_SERVICE_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("service duration too long"));
    }
    if price_cents > MAX_PRICE_CENTS {
        return Err(EngineError::LimitExceeded("price too large"));
    }
    Ok(())
}
