//! Planner input/output types (§4.6, §6).

use chrono::{DateTime, Utc};
use reelforge_producer::ProducerJob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An in-memory override of an input's value, applied before diffing against
/// the manifest (e.g. an unsaved edit in a prompt-editing UI). The edit wins
/// over whatever the event log last recorded for the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEdit {
    pub id: String,
    pub value: Option<Value>,
}

/// One surgical-regeneration request: re-run `source_job_id` and everything
/// downstream of it, specifically to repair `target_artifact_id` (§4.6 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRegeneration {
    #[serde(rename = "sourceJobId")]
    pub source_job_id: String,
    #[serde(rename = "targetArtifactId")]
    pub target_artifact_id: String,
}

/// Why a job was included in the plan (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobReason {
    Initial,
    ProducesMissing { missing: Vec<String> },
    TouchesDirtyInput { inputs: Vec<String> },
    TouchesDirtyArtefact { artefacts: Vec<String> },
    InputsHashChanged { stale: Vec<String> },
    Propagated { from: String },
    /// Forced into the plan by an explicit `reRunFrom` layer cutoff (§4.6
    /// step 5); not one of the spec's enumerated dirty-detection reasons,
    /// but recorded so the explanation stays complete.
    ReRunFromLayer { layer: usize },
    /// Forced into the plan by a surgical-regeneration request's downstream
    /// closure (§4.6 step 4).
    SurgicalTarget { source_job_id: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanExplanation {
    #[serde(rename = "dirtyInputs")]
    pub dirty_inputs: Vec<String>,
    #[serde(rename = "dirtyArtefacts")]
    pub dirty_artefacts: Vec<String>,
    #[serde(rename = "jobReasons")]
    pub job_reasons: Vec<(String, JobReason)>,
    #[serde(rename = "initialDirtyJobs")]
    pub initial_dirty_jobs: Vec<String>,
    #[serde(rename = "propagatedJobs")]
    pub propagated_jobs: Vec<String>,
    #[serde(default, rename = "surgicalTargets")]
    pub surgical_targets: Option<Vec<ArtifactRegeneration>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub revision: String,
    #[serde(rename = "manifestBaseHash")]
    pub manifest_base_hash: String,
    pub layers: Vec<Vec<ProducerJob>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "blueprintLayerCount")]
    pub blueprint_layer_count: usize,
    #[serde(default)]
    pub explanation: Option<PlanExplanation>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.is_empty())
    }

    pub fn job_count(&self) -> usize {
        self.layers.iter().map(|l| l.len()).sum()
    }
}

/// The full planner request (§4.6). `latest_inputs`/`latest_artefacts` are
/// the event log's "latest per key" projections — read by the caller (the
/// runner/engine), not the planner itself, so this crate stays free of any
/// storage dependency and is trivially unit-testable.
pub struct PlanRequest<'a> {
    pub manifest: &'a reelforge_manifest::Manifest,
    pub latest_inputs: &'a std::collections::BTreeMap<String, reelforge_events::InputEvent>,
    pub latest_artefacts: &'a std::collections::BTreeMap<String, reelforge_events::ArtefactEvent>,
    pub blueprint: &'a reelforge_producer::ProducerGraph,
    pub target_revision: String,
    pub pending_edits: Vec<PendingEdit>,
    pub re_run_from: Option<usize>,
    pub artifact_regenerations: Vec<ArtifactRegeneration>,
    pub up_to_layer: Option<usize>,
    pub collect_explanation: bool,
    pub created_at: DateTime<Utc>,
}
