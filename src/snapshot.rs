//! Versioned schema snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::diff::ChangeRecord;
use crate::error::{RegistryError, Result};
use crate::infer::FieldMap;
use crate::version::SchemaVersion;

/// One immutable, versioned record of a field map and its delta from the
/// previous version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Assigned by the coordinator, never by callers
    pub version: SchemaVersion,
    /// When this snapshot was created
    pub created_at: DateTime<Utc>,
    /// Field name to inferred type tag
    pub fields: FieldMap,
    /// Delta from the preceding version
    pub changes: Vec<ChangeRecord>,
    /// SHA256 checksum over version, fields and changes
    pub checksum: Checksum,
}

/// The portion of a snapshot covered by its checksum
#[derive(Serialize)]
struct Content<'a> {
    version: SchemaVersion,
    fields: &'a FieldMap,
    changes: &'a [ChangeRecord],
}

impl SchemaSnapshot {
    /// Create a new snapshot stamped with the current time
    pub fn new(
        version: SchemaVersion,
        fields: FieldMap,
        changes: Vec<ChangeRecord>,
    ) -> Result<Self> {
        let checksum = content_checksum(version, &fields, &changes)?;
        Ok(Self {
            version,
            created_at: Utc::now(),
            fields,
            changes,
            checksum,
        })
    }

    /// Verify the stored checksum matches the content
    pub fn verify(&self) -> Result<()> {
        let computed = content_checksum(self.version, &self.fields, &self.changes)?;
        if computed == self.checksum {
            Ok(())
        } else {
            Err(RegistryError::Corrupt {
                version: self.version,
                expected: self.checksum.to_string(),
                actual: computed.to_string(),
            })
        }
    }
}

fn content_checksum(
    version: SchemaVersion,
    fields: &FieldMap,
    changes: &[ChangeRecord],
) -> Result<Checksum> {
    Ok(Checksum::of(&Content {
        version,
        fields,
        changes,
    })?)
}
