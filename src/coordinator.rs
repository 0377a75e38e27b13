//! Evolution Coordinator
//!
//! Runs one evolution per batch: infer the field map, read the latest
//! snapshot, diff, and append a new version only when something changed.
//!
//! ```text
//! infer ──► latest() ──► absent ──────────► NoPriorSchema ──► append v1 ──► Persisted
//!                   └──► present ──► diff ─┬─ empty ──► NoChangeDetected (no write)
//!                                          └─ non-empty ──► ChangeDetected ──► append vN+1 ──► Persisted
//! ```
//!
//! A `VersionConflict` from the append means another writer claimed the
//! version first; the read-diff-append cycle is retried against the new
//! latest snapshot, up to `max_attempts` times in total.
//!
//! An append that times out may still have been stored. Before reporting the
//! timeout the coordinator re-reads the latest snapshot, and reports success
//! if it is the one just appended.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diff::{creations, diff};
use crate::error::{RegistryError, Result};
use crate::infer::{infer_schema_with, FieldMap, InferenceConfig};
use crate::snapshot::SchemaSnapshot;
use crate::store::VersionStore;
use crate::value::Batch;
use crate::version::SchemaVersion;

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Total read-diff-append attempts before a version conflict is fatal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Deadline for each individual version store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default)]
    pub inference: InferenceConfig,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            store_timeout_ms: default_store_timeout_ms(),
            inference: InferenceConfig::default(),
        }
    }
}

impl EvolutionConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Where an evolution call ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionState {
    NoPriorSchema,
    PriorSchemaFound,
    NoChangeDetected,
    ChangeDetected,
    Persisted,
}

impl fmt::Display for EvolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvolutionState::NoPriorSchema => "no_prior_schema",
            EvolutionState::PriorSchemaFound => "prior_schema_found",
            EvolutionState::NoChangeDetected => "no_change_detected",
            EvolutionState::ChangeDetected => "change_detected",
            EvolutionState::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful evolution call
#[derive(Debug, Clone, PartialEq)]
pub enum Evolution {
    /// The registry was empty; version 1 was appended
    Created(SchemaSnapshot),
    /// The schema changed; a new version was appended
    Evolved(SchemaSnapshot),
    /// The schema matched the latest snapshot, which is returned untouched
    Unchanged(SchemaSnapshot),
}

impl Evolution {
    pub fn snapshot(&self) -> &SchemaSnapshot {
        match self {
            Evolution::Created(s) | Evolution::Evolved(s) | Evolution::Unchanged(s) => s,
        }
    }

    pub fn into_snapshot(self) -> SchemaSnapshot {
        match self {
            Evolution::Created(s) | Evolution::Evolved(s) | Evolution::Unchanged(s) => s,
        }
    }

    /// Whether this call appended a new snapshot
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Evolution::Unchanged(_))
    }

    /// Terminal state of the call
    pub fn state(&self) -> EvolutionState {
        match self {
            Evolution::Unchanged(_) => EvolutionState::NoChangeDetected,
            Evolution::Created(_) | Evolution::Evolved(_) => EvolutionState::Persisted,
        }
    }
}

/// Orchestrates inference, diffing and versioned appends against a store.
///
/// The store handle is injected and shared; the coordinator holds no other
/// state, so it can be cloned freely across tasks.
pub struct EvolutionCoordinator<S: ?Sized> {
    store: Arc<S>,
    config: EvolutionConfig,
}

impl<S: ?Sized> Clone for EvolutionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: VersionStore + ?Sized> EvolutionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EvolutionConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EvolutionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Infer the batch's schema and evolve the registry towards it.
    ///
    /// A batch that cannot be inferred fails with `MalformedBatch` before the
    /// store is touched.
    pub async fn evolve(&self, batch: &Batch) -> Result<Evolution> {
        info!(records = batch.len(), "Starting schema evolution");
        let fields = infer_schema_with(batch, &self.config.inference)?;
        self.evolve_fields(fields).await
    }

    /// Evolve the registry towards an already inferred field map
    pub async fn evolve_fields(&self, fields: FieldMap) -> Result<Evolution> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&fields).await {
                Err(e) if e.is_conflict() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Version conflict, retrying evolution"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One read-diff-append pass
    async fn attempt(&self, fields: &FieldMap) -> Result<Evolution> {
        let latest = self.timed("latest", self.store.latest()).await?;

        let (version, changes, first) = match latest {
            None => {
                info!(
                    state = %EvolutionState::NoPriorSchema,
                    "No existing schema found, creating {}",
                    SchemaVersion::FIRST
                );
                (SchemaVersion::FIRST, creations(fields), true)
            }
            Some(latest) => {
                debug!(state = %EvolutionState::PriorSchemaFound, latest = %latest.version);
                let changes = diff(&latest.fields, fields);
                if changes.is_empty() {
                    info!(
                        state = %EvolutionState::NoChangeDetected,
                        version = %latest.version,
                        "Schema is identical, no evolution required"
                    );
                    return Ok(Evolution::Unchanged(latest));
                }
                let version = latest.version.next();
                info!(
                    state = %EvolutionState::ChangeDetected,
                    changes = changes.len(),
                    "Schema changes detected, evolving from {} to {}",
                    latest.version,
                    version
                );
                (version, changes, false)
            }
        };

        let snapshot = SchemaSnapshot::new(version, fields.clone(), changes)?;
        match self.timed("append", self.store.append(&snapshot)).await {
            Ok(()) => {}
            Err(e @ RegistryError::Timeout { .. }) => {
                if !self.landed(&snapshot).await {
                    return Err(e);
                }
                warn!(%version, "Append timed out after the snapshot was stored");
            }
            Err(e) => return Err(e),
        }
        info!(state = %EvolutionState::Persisted, %version, "Saved schema snapshot");

        Ok(if first {
            Evolution::Created(snapshot)
        } else {
            Evolution::Evolved(snapshot)
        })
    }

    /// Whether `snapshot` is the latest stored one after its append timed out
    async fn landed(&self, snapshot: &SchemaSnapshot) -> bool {
        match self.timed("latest", self.store.latest()).await {
            Ok(Some(latest)) => latest == *snapshot,
            Ok(None) => false,
            Err(e) => {
                warn!(
                    version = %snapshot.version,
                    error = %e,
                    "Could not reconcile timed-out append"
                );
                false
            }
        }
    }

    /// Latest accepted snapshot, for read-only consumers
    pub async fn latest(&self) -> Result<Option<SchemaSnapshot>> {
        self.timed("latest", self.store.latest()).await
    }

    /// Field map of the latest accepted snapshot
    pub async fn latest_fields(&self) -> Result<Option<FieldMap>> {
        Ok(self.latest().await?.map(|s| s.fields))
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.config.store_timeout();
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| RegistryError::Timeout { operation, after })?
    }
}
