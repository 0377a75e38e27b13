//! Schema version numbers

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Version of a schema snapshot.
///
/// Versions start at 1 and are assigned by the coordinator, one past the
/// latest stored version. They are never supplied by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(NonZeroU64);

impl SchemaVersion {
    /// The version given to the first snapshot of an empty registry
    pub const FIRST: SchemaVersion = SchemaVersion(NonZeroU64::MIN);

    /// Create from a raw number, rejecting zero
    pub fn new(n: u64) -> Option<Self> {
        NonZeroU64::new(n).map(Self)
    }

    /// The version that follows this one
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The version before this one, if any
    pub fn previous(self) -> Option<Self> {
        Self::new(self.0.get() - 1)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Version that follows `latest`, or the first version for an empty registry
    pub fn after(latest: Option<SchemaVersion>) -> Self {
        latest.map_or(Self::FIRST, Self::next)
    }

    /// File stem used by the file store (e.g., "v3")
    pub fn file_stem(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for SchemaVersion {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Strip leading 'v' if present
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| RegistryError::InvalidVersion(s.to_string()))
    }
}
