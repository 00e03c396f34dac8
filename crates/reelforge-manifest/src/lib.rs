//! The manifest service (§3 "Manifest", §4.8).
//!
//! A [`Manifest`] is *derived*, never authoritative: it is either read back
//! from a snapshot written by a previous run, or rebuilt fresh by folding the
//! event log. The event log is the only source of truth; manifests exist so
//! the planner does not have to replay the whole log on every invocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reelforge_events::{ArtefactEvent, ArtefactStatus, Diagnostics, EventLog, EventLogError};
use reelforge_hash::{ArtefactHashInput, HashError};
use reelforge_store::{StorageBackend, StorageContext, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse manifest at '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestInputEntry {
    pub hash: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestArtefactEntry {
    pub hash: String,
    pub blob: Option<reelforge_store::BlobRef>,
    #[serde(rename = "producedBy")]
    pub produced_by: String,
    pub status: ArtefactStatus,
    #[serde(rename = "inputsHash")]
    pub inputs_hash: String,
    #[serde(default)]
    pub diagnostics: Option<Diagnostics>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub revision: String,
    #[serde(default, rename = "baseRevision")]
    pub base_revision: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub inputs: BTreeMap<String, ManifestInputEntry>,
    pub artefacts: BTreeMap<String, ManifestArtefactEntry>,
    #[serde(default)]
    pub timeline: serde_json::Value,
}

pub const INITIAL_REVISION: &str = "rev-0000";

impl Manifest {
    /// The empty manifest returned by `loadCurrent` when no pointer exists.
    pub fn empty(created_at: DateTime<Utc>) -> Self {
        Self {
            revision: INITIAL_REVISION.to_string(),
            base_revision: None,
            created_at,
            inputs: BTreeMap::new(),
            artefacts: BTreeMap::new(),
            timeline: serde_json::json!({}),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.inputs.is_empty()
    }

    /// `sha256(stable-serialisation(manifest))`.
    pub fn hash(&self) -> Result<String, HashError> {
        reelforge_hash::hash_value(self)
    }
}

/// The current-pointer file (`current.json`, §6): `{revision, manifestPath,
/// hash, baseRevision?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPointer {
    pub revision: String,
    #[serde(rename = "manifestPath")]
    pub manifest_path: String,
    pub hash: String,
    #[serde(default, rename = "baseRevision")]
    pub base_revision: Option<String>,
}

const CURRENT_POINTER_PATH: &str = "current.json";

fn manifest_snapshot_path(revision: &str) -> String {
    format!("manifests/{revision}.json")
}

/// Fold `deriveArtefactHash` over an [`ArtefactEvent`].
fn derive_artefact_hash(event: &ArtefactEvent) -> Result<String, HashError> {
    reelforge_hash::derive_artefact_hash(&ArtefactHashInput {
        artefact_id: &event.artefact_id,
        inputs_hash: &event.inputs_hash,
        status: status_str(event.status),
        blob_hash: event.output.blob.as_ref().map(|b| b.hash.as_str()),
        blob_size: event.output.blob.as_ref().map(|b| b.size),
        blob_mime_type: event.output.blob.as_ref().map(|b| b.mime_type.as_str()),
    })
}

fn status_str(status: ArtefactStatus) -> &'static str {
    match status {
        ArtefactStatus::Succeeded => "succeeded",
        ArtefactStatus::Failed => "failed",
        ArtefactStatus::Skipped => "skipped",
    }
}

/// Reads and writes manifest snapshots and the current-pointer file, and
/// rebuilds manifests fresh from an [`EventLog`].
pub struct ManifestService<'a, B: StorageBackend> {
    ctx: &'a StorageContext<B>,
}

impl<'a, B: StorageBackend> ManifestService<'a, B> {
    pub fn new(ctx: &'a StorageContext<B>) -> Self {
        Self { ctx }
    }

    /// `loadCurrent(movieId)`: reads the pointer file and the referenced
    /// snapshot, or returns the empty manifest if none exists yet.
    #[tracing::instrument(skip(self), fields(movie_id = %self.ctx.movie_id))]
    pub async fn load_current(&self, now: DateTime<Utc>) -> Result<(Manifest, String), ManifestError> {
        let pointer_path = self.ctx.resolve(&[CURRENT_POINTER_PATH]);
        let pointer = match self.ctx.backend.read_string(&pointer_path).await {
            Ok(content) => {
                let pointer: ManifestPointer =
                    serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                        path: pointer_path.to_string(),
                        source,
                    })?;
                pointer
            }
            Err(StoreError::NotFound(_)) => {
                let manifest = Manifest::empty(now);
                let hash = manifest.hash()?;
                return Ok((manifest, hash));
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot_path = self.ctx.resolve(&[&pointer.manifest_path]);
        let content = self.ctx.backend.read_string(&snapshot_path).await?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: snapshot_path.to_string(),
                source,
            })?;
        Ok((manifest, pointer.hash))
    }

    /// `saveManifest(manifest, {movieId, previousHash, clock})`: writes an
    /// immutable snapshot under `manifests/{revision}.json` and atomically
    /// updates `current.json` to point at it.
    ///
    /// `previous_hash` is accepted for future optimistic-concurrency checks
    /// (detecting a concurrent writer) but is not itself validated here: the
    /// append-only event log, not the manifest pointer, is the engine's
    /// concurrency boundary (§5).
    #[tracing::instrument(skip(self, manifest), fields(movie_id = %self.ctx.movie_id, revision = %manifest.revision))]
    pub async fn save_manifest(
        &self,
        manifest: &Manifest,
        _previous_hash: Option<&str>,
    ) -> Result<String, ManifestError> {
        let hash = manifest.hash()?;
        let manifest_path = manifest_snapshot_path(&manifest.revision);
        let snapshot_path = self.ctx.resolve(&[&manifest_path]);
        let body = serde_json::to_vec_pretty(manifest).map_err(ManifestError::Serialize)?;
        self.ctx.backend.write(&snapshot_path, &body).await?;

        let pointer = ManifestPointer {
            revision: manifest.revision.clone(),
            manifest_path,
            hash: hash.clone(),
            base_revision: manifest.base_revision.clone(),
        };
        let pointer_path = self.ctx.resolve(&[CURRENT_POINTER_PATH]);
        let pointer_body = serde_json::to_vec_pretty(&pointer).map_err(ManifestError::Serialize)?;
        self.ctx.backend.write(&pointer_path, &pointer_body).await?;

        Ok(hash)
    }

    /// `buildFromEvents({movieId, targetRevision, baseRevision, eventLog,
    /// clock})`: folds the event streams into a fresh manifest. The latest
    /// event per key wins; only `status == succeeded` artefacts survive into
    /// `manifest.artefacts` (§3, §4.8).
    #[tracing::instrument(skip(self, event_log), fields(movie_id = %self.ctx.movie_id, target_revision = %target_revision))]
    pub async fn build_from_events(
        &self,
        event_log: &EventLog<'_, B>,
        target_revision: &str,
        base_revision: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Manifest, ManifestError> {
        let latest_inputs = event_log.latest_inputs().await?;
        let latest_artefacts = event_log.latest_artefacts().await?;

        let mut inputs = BTreeMap::new();
        for (id, event) in latest_inputs {
            inputs.insert(
                id,
                ManifestInputEntry {
                    hash: event.hash,
                    value: event.value,
                },
            );
        }

        let mut artefacts = BTreeMap::new();
        for (id, event) in latest_artefacts {
            if event.status != ArtefactStatus::Succeeded {
                continue;
            }
            let hash = derive_artefact_hash(&event)?;
            artefacts.insert(
                id,
                ManifestArtefactEntry {
                    hash,
                    blob: event.output.blob.clone(),
                    produced_by: event.produced_by.clone(),
                    status: event.status,
                    inputs_hash: event.inputs_hash.clone(),
                    diagnostics: event.diagnostics.clone(),
                    created_at: event.created_at,
                },
            );
        }

        Ok(Manifest {
            revision: target_revision.to_string(),
            base_revision: base_revision.map(str::to_string),
            created_at: now,
            inputs,
            artefacts,
            timeline: serde_json::json!({}),
        })
    }
}
