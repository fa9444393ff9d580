//! Routing registry (C3) — the authoritative, versioned record of the
//! active region and its endpoints.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Singleton, process-wide routing record. `version` increases by exactly
/// one per successful failover and never changes on a failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub active_region: String,
    pub relational_primary_endpoint: String,
    pub cache_master_endpoint: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl RoutingRecord {
    /// The record created at orchestrator start from static configuration.
    pub fn initial(active_region: impl Into<String>, relational_endpoint: impl Into<String>, cache_endpoint: impl Into<String>) -> Self {
        Self {
            active_region: active_region.into(),
            relational_primary_endpoint: relational_endpoint.into(),
            cache_master_endpoint: cache_endpoint.into(),
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// C3: the routing registry. C5 is the only permitted writer; the registry
/// enforces that by refusing a second concurrent `swap` with `busy` rather
/// than blocking, so no writer ever waits behind another writer.
pub struct RoutingRegistry {
    record: RwLock<RoutingRecord>,
    writer_active: AtomicBool,
}

impl RoutingRegistry {
    pub fn new(initial: RoutingRecord) -> Self {
        Self {
            record: RwLock::new(initial),
            writer_active: AtomicBool::new(false),
        }
    }

    /// Safe for concurrent readers; returns a self-consistent snapshot.
    pub fn read(&self) -> RoutingRecord {
        self.record.read().clone()
    }

    /// Atomically replaces `active_region`, both endpoints, increments
    /// `version`, and stamps `updated_at`. Fails with `busy` if another
    /// swap is already in flight — at-most-one-writer discipline.
    pub fn swap(
        &self,
        new_active_region: impl Into<String>,
        new_relational_endpoint: impl Into<String>,
        new_cache_endpoint: impl Into<String>,
    ) -> Result<RoutingRecord, RegistryError> {
        if self.writer_active.swap(true, Ordering::AcqRel) {
            return Err(RegistryError::Busy);
        }
        let result = {
            let mut guard = self.record.write();
            guard.active_region = new_active_region.into();
            guard.relational_primary_endpoint = new_relational_endpoint.into();
            guard.cache_master_endpoint = new_cache_endpoint.into();
            guard.version += 1;
            guard.updated_at = Utc::now();
            guard.clone()
        };
        self.writer_active.store(false, Ordering::Release);
        tracing::info!(version = result.version, active_region = %result.active_region, "routing record swapped");
        Ok(result)
    }
}
