//! Error types for the shape registry

use std::time::Duration;

use thiserror::Error;

use crate::version::SchemaVersion;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Shape registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Version store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Version store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Version conflict: cannot append {attempted}, latest stored version is {latest}")]
    VersionConflict {
        attempted: SchemaVersion,
        latest: String,
    },

    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    #[error("Snapshot {version} is corrupt: expected checksum {expected}, got {actual}")]
    Corrupt {
        version: SchemaVersion,
        expected: String,
        actual: String,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl RegistryError {
    /// Whether the coordinator may retry the read-diff-append cycle
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::VersionConflict { .. })
    }

    pub(crate) fn conflict(attempted: SchemaVersion, latest: Option<SchemaVersion>) -> Self {
        RegistryError::VersionConflict {
            attempted,
            latest: latest.map_or_else(|| "none".to_string(), |v| v.to_string()),
        }
    }
}
