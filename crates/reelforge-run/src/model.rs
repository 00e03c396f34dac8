//! Runtime types exchanged with the `Produce` capability (§4.7, §6).
//!
//! None of these are part of the persisted event/manifest schema (see
//! `reelforge-events`/`reelforge-manifest` for those) — they exist only for
//! the in-process call into an external producer adapter, so they carry no
//! serde derives of their own beyond what their fields already provide.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reelforge_condition::FanInValue;
use reelforge_events::{ArtefactStatus, Diagnostics};
use reelforge_producer::JobContext;
use reelforge_store::{BlobInput, BlobRef};
use serde_json::Value;

/// A value resolved for one job input (§4.7 steps 3-7). Binary artefacts
/// start as a [`ResolvedValue::BlobRef`] (cheap — no bytes read) and are
/// only promoted to [`ResolvedValue::BlobData`] in step 7, after condition
/// evaluation has had a chance to drop the input entirely.
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    Scalar(Value),
    FanIn(FanInValue),
    BlobRef(BlobRef),
    BlobData(BlobInput),
}

impl ResolvedValue {
    /// A JSON projection usable as a condition-evaluation environment value
    /// (§4.9); a blob's bytes never enter this projection, only its
    /// metadata.
    pub fn as_condition_value(&self) -> Value {
        match self {
            Self::Scalar(v) => v.clone(),
            Self::FanIn(f) => serde_json::json!({
                "groupBy": f.group_by,
                "orderBy": f.order_by,
                "groups": f.groups,
            }),
            Self::BlobRef(b) => serde_json::json!({ "hash": b.hash, "size": b.size, "mimeType": b.mime_type }),
            Self::BlobData(b) => serde_json::json!({ "mimeType": b.mime_type, "size": b.data.len() }),
        }
    }
}

/// A producer job enriched with everything the runner resolved for it
/// (§4.7 steps 3-7) — what `Produce` actually receives as `job` (§6).
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub job_id: String,
    pub producer: String,
    pub provider: String,
    pub provider_model: String,
    pub rate_key: String,
    pub resolved_inputs: BTreeMap<String, ResolvedValue>,
    /// Absolute-within-storage paths for every `Artifact:` id discovered
    /// inside a resolved value's string fields (§4.7 step 6), keyed by that
    /// id.
    pub asset_blob_paths: BTreeMap<String, String>,
    /// The job's declared context (namespace path, indices, producer alias,
    /// SDK mapping, fan-in descriptors, input conditions) with this call's
    /// `resolved_inputs`/`asset_blob_paths` folded into `extras` — a
    /// provider adapter routes on `producer_alias`/`sdk_mapping` here rather
    /// than on the flat fields above.
    pub context: JobContext,
}

/// `Produce(request)` (§6): the request handed to the external producer
/// capability.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub movie_id: String,
    pub job: JobDescriptor,
    pub layer_index: usize,
    pub attempt: u32,
    pub revision: String,
}

#[derive(Debug, Clone)]
pub struct ProducedArtefact {
    pub artefact_id: String,
    pub status: Option<ArtefactStatus>,
    pub blob: Option<BlobInput>,
    pub diagnostics: Option<Diagnostics>,
}

#[derive(Debug, Clone)]
pub struct ProduceResult {
    pub job_id: String,
    pub status: ArtefactStatus,
    pub artefacts: Vec<ProducedArtefact>,
    pub diagnostics: Option<Diagnostics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct JobRunRecord {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub produced: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub revision: String,
    pub jobs: Vec<JobRunRecord>,
    pub manifest: reelforge_manifest::Manifest,
}

/// A cooperative cancellation flag checked between jobs and layers (§5
/// "Cancellation & timeouts"). Setting it never interrupts an in-flight
/// `Produce` call; the runner observes it at the next job boundary and
/// records a `cancelled` diagnostic for everything that didn't start.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
