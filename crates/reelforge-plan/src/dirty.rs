//! Dirty input/artefact detection and per-job input-content hashing
//! (§4.6 steps 1-2).

use std::collections::{BTreeMap, BTreeSet};

use reelforge_canon::strip_indices;
use reelforge_events::{ArtefactEvent, ArtefactStatus, InputEvent};
use reelforge_hash::{ArtefactHashInput, HashError, InputContent};
use reelforge_manifest::Manifest;
use reelforge_producer::ProducerJob;
use serde_json::Value;

use crate::model::PendingEdit;

#[derive(Debug, Clone)]
pub struct EffectiveInput {
    pub hash: String,
    pub value: Option<Value>,
}

/// Fold `pendingEdits` over `latestInputs`, edit wins (§4.6 step 1).
pub fn effective_inputs(
    latest_inputs: &BTreeMap<String, InputEvent>,
    pending_edits: &[PendingEdit],
) -> Result<BTreeMap<String, EffectiveInput>, HashError> {
    let mut out: BTreeMap<String, EffectiveInput> = latest_inputs
        .iter()
        .map(|(id, event)| {
            (
                id.clone(),
                EffectiveInput { hash: event.hash.clone(), value: event.value.clone() },
            )
        })
        .collect();

    for edit in pending_edits {
        let hash = reelforge_hash::hash_value(&edit.value)?;
        out.insert(edit.id.clone(), EffectiveInput { hash, value: edit.value.clone() });
    }

    Ok(out)
}

/// `dirtyInputs`: ids whose effective hash differs from the manifest's
/// recorded hash (or which have no manifest entry at all).
pub fn dirty_inputs(
    effective: &BTreeMap<String, EffectiveInput>,
    manifest: &Manifest,
) -> BTreeSet<String> {
    effective
        .iter()
        .filter(|(id, eff)| {
            manifest.inputs.get(*id).map(|entry| entry.hash.as_str()) != Some(eff.hash.as_str())
        })
        .map(|(id, _)| id.clone())
        .collect()
}

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

/// `dirtyArtefacts` (§4.6 step 1): among *succeeded* latest artefact events,
/// those whose derived hash differs from the manifest's recorded hash.
pub fn dirty_artefacts(
    latest_artefacts: &BTreeMap<String, ArtefactEvent>,
    manifest: &Manifest,
) -> Result<BTreeSet<String>, HashError> {
    let mut out = BTreeSet::new();
    for (id, event) in latest_artefacts {
        if event.status != ArtefactStatus::Succeeded {
            continue;
        }
        let hash = derive_artefact_hash(event)?;
        let recorded = manifest.artefacts.get(id).map(|e| e.hash.as_str());
        if recorded != Some(hash.as_str()) {
            out.insert(id.clone());
        }
    }
    Ok(out)
}

/// Every `Artifact:` id a job's readiness genuinely depends on: its own
/// declared artefact inputs, plus every fan-in member behind a fan-in
/// target input (§4.7 step 1; the planner needs the same expanded view to
/// detect dirtiness that the runner needs to gate on).
pub fn artefact_input_ids(job: &ProducerJob) -> BTreeSet<String> {
    let mut out: BTreeSet<String> = job
        .inputs
        .iter()
        .filter(|id| reelforge_canon::is_canonical_artifact_id(id))
        .cloned()
        .collect();
    for descriptor in job.context.fan_in.values() {
        for member in &descriptor.members {
            out.insert(member.id.clone());
        }
    }
    out
}

/// `hashInputContents(inputs, manifest)` (§4.6 step 2d, §9): a stable hash
/// of a job's resolved input contents. Upstream artefact inputs contribute
/// their *manifest hash*, never raw blob bytes, so the function stays
/// bounded by manifest size.
pub fn hash_job_input_contents(
    job: &ProducerJob,
    effective: &BTreeMap<String, EffectiveInput>,
    manifest: &Manifest,
) -> Result<String, HashError> {
    let mut entries: Vec<(String, InputContent)> = Vec::new();

    for input_id in &job.inputs {
        if job.context.fan_in.contains_key(input_id) {
            continue;
        }
        if let Some(eff) = effective.get(input_id) {
            entries.push((input_id.clone(), InputContent::Value(eff.value.clone().unwrap_or(Value::Null))));
        } else {
            let upstream_hash = manifest.artefacts.get(input_id).map(|e| e.hash.clone()).unwrap_or_default();
            entries.push((input_id.clone(), InputContent::UpstreamHash(upstream_hash)));
        }
    }

    for member_id in artefact_input_ids(job) {
        let upstream_hash = manifest.artefacts.get(&member_id).map(|e| e.hash.clone()).unwrap_or_default();
        entries.push((member_id, InputContent::UpstreamHash(upstream_hash)));
    }

    reelforge_hash::hash_input_contents(entries)
}

/// `strip_indices` applied to a plain (non-canonical-kind-prefixed) id is a
/// no-op beyond bracket removal; used to match an instance id's base form
/// against the dirty-inputs set (§4.6 step 2b: "any input base id").
pub fn base_id(id: &str) -> String {
    strip_indices(id)
}
