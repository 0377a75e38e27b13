//! In-memory version store
//!
//! Nothing survives the process. Used by tests and by embedders that keep
//! their own durable copy.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::VersionStore;
use crate::error::{RegistryError, Result};
use crate::snapshot::SchemaSnapshot;
use crate::version::SchemaVersion;

/// In-memory version store.
///
/// The version check and the push happen under one write lock, so
/// concurrent appends of the same version resolve to exactly one winner.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    snapshots: RwLock<Vec<SchemaSnapshot>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn latest(&self) -> Result<Option<SchemaSnapshot>> {
        Ok(self.snapshots.read().last().cloned())
    }

    async fn append(&self, snapshot: &SchemaSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write();
        let latest = snapshots.last().map(|s| s.version);
        if snapshot.version != SchemaVersion::after(latest) {
            return Err(RegistryError::conflict(snapshot.version, latest));
        }
        snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn get(&self, version: SchemaVersion) -> Result<Option<SchemaSnapshot>> {
        // Versions are contiguous from 1, so the index is version - 1
        let snapshots = self.snapshots.read();
        Ok(usize::try_from(version.get() - 1)
            .ok()
            .and_then(|index| snapshots.get(index).cloned()))
    }

    async fn history(&self) -> Result<Vec<SchemaSnapshot>> {
        Ok(self.snapshots.read().clone())
    }
}
