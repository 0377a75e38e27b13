//! Version Store
//!
//! Durable, append-only collections of schema snapshots keyed by version.
//!
//! Implementations:
//! - [`MemoryVersionStore`]: in-process storage, used by tests and embedders
//! - [`FileVersionStore`]: one JSON file per version, optionally mirrored
//!   into git history

mod file;
mod memory;

pub use file::{FileStoreOptions, FileVersionStore};
pub use memory::MemoryVersionStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::SchemaSnapshot;
use crate::version::SchemaVersion;

/// Interface for snapshot persistence.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Snapshot with the highest version.
    ///
    /// Returns `None` if the store is empty.
    async fn latest(&self) -> Result<Option<SchemaSnapshot>>;

    /// Append a snapshot.
    ///
    /// Succeeds only if `snapshot.version` is exactly one past the latest
    /// stored version at write time (or the first version on an empty store).
    /// Otherwise fails with `VersionConflict` and stores nothing.
    async fn append(&self, snapshot: &SchemaSnapshot) -> Result<()>;

    /// Snapshot with the given version, if stored.
    async fn get(&self, version: SchemaVersion) -> Result<Option<SchemaSnapshot>>;

    /// Every stored snapshot in ascending version order.
    async fn history(&self) -> Result<Vec<SchemaSnapshot>>;
}
