use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::limits::*;

/// Per-tenant engines, keyed by the database name of the pgwire connection.
/// Each tenant gets its own Engine, WAL file and compactor task.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    engine_config: EngineConfig,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, engine_config: EngineConfig) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            engine_config,
        }
    }

    /// Get or lazily create an engine for the given tenant. Names that
    /// sanitize to the same WAL file share one engine.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }

        // Path traversal guard.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }
        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }

        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Entry lock: two first connections to one tenant must not open the WAL twice.
        let entry = self.engines.entry(safe_name.clone());
        if let dashmap::Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path, self.engine_config)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        entry.or_insert(engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!("opened tenant {safe_name}");
        Ok(engine)
    }
}
