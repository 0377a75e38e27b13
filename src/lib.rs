//! Shape Registry
//!
//! A versioned, append-only registry that tracks how the structural shape of
//! ingested documents changes over time.
//!
//! ## Features
//!
//! - **Batch Inference**: One type tag per field, decided over the whole batch
//! - **Field-Level Diffs**: Every snapshot records what was added, removed or retyped
//! - **Idempotent Evolution**: Identical input never produces a new version
//! - **Gapless Versions**: Compare-and-append with bounded retry on conflict
//! - **Checksum Validation**: SHA256 checksums guard stored snapshots
//!
//! ## Architecture
//!
//! ```text
//! Batch ──► infer ──► FieldMap ─┐
//!                               ├──► diff ──► SchemaSnapshot ──► VersionStore::append
//! VersionStore::latest ─────────┘
//! ```
//!
//! ```text
//! registry/
//! ├── snapshots/
//! │   ├── v1.json
//! │   ├── v2.json
//! │   └── v3.json
//! └── .git/          (optional history, one commit and tag per version)
//! ```

pub mod checksum;
pub mod config;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod infer;
pub mod snapshot;
pub mod store;
pub mod value;
pub mod version;

pub use checksum::Checksum;
pub use config::ShapesConfig;
pub use coordinator::{Evolution, EvolutionConfig, EvolutionCoordinator, EvolutionState};
pub use diff::{diff, ChangeAction, ChangeRecord};
pub use error::{RegistryError, Result};
pub use infer::{infer_schema, DataType, FieldMap, InferenceConfig, MixedTypes};
pub use snapshot::SchemaSnapshot;
pub use store::{FileStoreOptions, FileVersionStore, MemoryVersionStore, VersionStore};
pub use value::{Batch, Record, Value};
pub use version::SchemaVersion;
