//! Per-job resolution pipeline (§4.7 steps 1, 3, 4, 5, 6, 7): everything the
//! runner must work out before it is safe to call `Produce`.

use std::collections::{BTreeMap, BTreeSet};

use reelforge_blueprint::EdgeConditionDefinition;
use reelforge_canon::{is_canonical_artifact_id, strip_indices};
use reelforge_events::{ArtefactStatus, EventLog};
use reelforge_producer::ProducerJob;
use reelforge_store::StorageBackend;
use reelforge_store::StorageContext;
use serde_json::Value;

use crate::model::ResolvedValue;
use crate::RunError;

/// §4.7 step 1: every canonical artefact id a job's readiness depends on —
/// its direct artefact inputs, every fan-in member, and the base artefact
/// id each input condition's `when` path is rooted at.
pub fn required_artefact_ids(job: &ProducerJob) -> BTreeSet<String> {
    let mut out: BTreeSet<String> =
        job.inputs.iter().filter(|id| is_canonical_artifact_id(id)).cloned().collect();

    for descriptor in job.context.fan_in.values() {
        for member in &descriptor.members {
            out.insert(member.id.clone());
        }
    }

    for condition in job.context.input_conditions.values() {
        for when in condition_when_paths(&condition.condition) {
            if let Some(base) = base_artifact_id(&when) {
                out.insert(base);
            }
        }
    }

    out
}

fn condition_when_paths(condition: &EdgeConditionDefinition) -> Vec<String> {
    let mut out = Vec::new();
    collect_when_paths(condition, &mut out);
    out
}

fn collect_when_paths(condition: &EdgeConditionDefinition, out: &mut Vec<String>) {
    match condition {
        EdgeConditionDefinition::Clause(clause) => out.push(clause.when.clone()),
        EdgeConditionDefinition::All { all } => all.iter().for_each(|c| collect_when_paths(c, out)),
        EdgeConditionDefinition::Any { any } => any.iter().for_each(|c| collect_when_paths(c, out)),
    }
}

/// The base `Artifact:` id a condition's `when` path is rooted at: the
/// first two dotted segments, index-stripped. Mirrors the ancestor-prefix
/// fallback in `reelforge_condition::resolve_path` — a path that is already
/// a fully-qualified `Artifact:`/`Input:` id uses that first segment alone
/// as its base; `Input:`-rooted conditions don't gate on an artefact at
/// all.
fn base_artifact_id(when_path: &str) -> Option<String> {
    let stripped = strip_indices(when_path);
    let segments: Vec<&str> = stripped.split('.').collect();
    let first = *segments.first()?;
    if let Some(rest) = first.strip_prefix("Artifact:") {
        return Some(format!("Artifact:{rest}"));
    }
    if first.starts_with("Input:") {
        return None;
    }
    let take = segments.len().min(2);
    Some(format!("Artifact:{}", segments[..take].join(".")))
}

/// §4.7 step 3: read every required artefact's latest succeeded event and
/// materialise a value — JSON decoded, text decoded to a string, anything
/// else left as a [`ResolvedValue::BlobRef`] until step 7. Ids with no
/// succeeded event are simply absent from the result.
pub async fn resolve_required_artefacts<B: StorageBackend>(
    ctx: &StorageContext<B>,
    event_log: &EventLog<'_, B>,
    required: &BTreeSet<String>,
) -> Result<BTreeMap<String, ResolvedValue>, RunError> {
    let mut out = BTreeMap::new();
    for id in required {
        let Some(event) = event_log.latest_artefact(id).await? else { continue };
        if event.status != ArtefactStatus::Succeeded {
            continue;
        }
        let Some(blob_ref) = event.output.blob.clone() else { continue };
        let value = match blob_ref.mime_type.as_str() {
            "application/json" => {
                let path = ctx.blob_path(&blob_ref.hash, &blob_ref.mime_type);
                let text = ctx.backend.read_string(&path).await?;
                let json: Value = serde_json::from_str(&text).map_err(RunError::DecodeJson)?;
                ResolvedValue::Scalar(json)
            }
            "text/plain" => {
                let path = ctx.blob_path(&blob_ref.hash, &blob_ref.mime_type);
                let text = ctx.backend.read_string(&path).await?;
                ResolvedValue::Scalar(Value::String(text))
            }
            _ => ResolvedValue::BlobRef(blob_ref),
        };
        out.insert(id.clone(), value);
    }
    Ok(out)
}

/// Required, unconditional, non-fan-in artefact inputs that resolved to
/// nothing — the artefact is missing, failed, or was skipped. The job
/// cannot run (§4.7 Open Question: a skipped producer's consumers fail
/// with `missing_input` rather than silently proceeding as if the input
/// were absent).
pub fn missing_unconditional_required(
    job: &ProducerJob,
    resolved: &BTreeMap<String, ResolvedValue>,
) -> Vec<String> {
    job.inputs
        .iter()
        .filter(|id| is_canonical_artifact_id(id))
        .filter(|id| !job.context.fan_in.contains_key(id.as_str()))
        .filter(|id| !job.context.input_conditions.contains_key(id.as_str()))
        .filter(|id| !resolved.contains_key(id.as_str()))
        .cloned()
        .collect()
}

/// Project resolved values into the flat environment condition evaluation
/// reads (§4.9).
pub fn condition_env(resolved: &BTreeMap<String, ResolvedValue>) -> BTreeMap<String, Value> {
    resolved.iter().map(|(k, v)| (k.clone(), v.as_condition_value())).collect()
}

/// §4.7 step 6: find every `Artifact:…` id hiding inside a resolved
/// scalar's string fields (e.g. a timeline referencing `assetId`s by
/// canonical id) and record where that artefact's blob currently lives —
/// read straight from the event log, so this survives a stale manifest.
pub async fn resolve_asset_blob_paths<B: StorageBackend>(
    ctx: &StorageContext<B>,
    event_log: &EventLog<'_, B>,
    resolved: &BTreeMap<String, ResolvedValue>,
) -> Result<BTreeMap<String, String>, RunError> {
    let mut ids = BTreeSet::new();
    for value in resolved.values() {
        if let ResolvedValue::Scalar(json) = value {
            collect_artifact_ids(json, &mut ids);
        }
    }

    let mut out = BTreeMap::new();
    for id in ids {
        if let Some(event) = event_log.latest_artefact(&id).await? {
            if event.status == ArtefactStatus::Succeeded {
                if let Some(blob) = &event.output.blob {
                    out.insert(id, ctx.blob_path(&blob.hash, &blob.mime_type).to_string());
                }
            }
        }
    }
    Ok(out)
}

fn collect_artifact_ids(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) if is_canonical_artifact_id(s) => {
            out.insert(s.clone());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_artifact_ids(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_artifact_ids(v, out)),
        _ => {}
    }
}

/// §4.7 step 7: turn every still-unread [`ResolvedValue::BlobRef`] into a
/// [`ResolvedValue::BlobData`] by reading its bytes — done last, after
/// condition evaluation has had the chance to drop an input entirely, so a
/// binary artefact filtered out by an unsatisfied condition is never read.
pub async fn materialise_blob_inputs<B: StorageBackend>(
    ctx: &StorageContext<B>,
    resolved: &mut BTreeMap<String, ResolvedValue>,
) -> Result<(), RunError> {
    let blob_ids: Vec<String> = resolved
        .iter()
        .filter(|(_, v)| matches!(v, ResolvedValue::BlobRef(_)))
        .map(|(k, _)| k.clone())
        .collect();

    for id in blob_ids {
        let blob_ref = match resolved.get(&id) {
            Some(ResolvedValue::BlobRef(b)) => b.clone(),
            _ => continue,
        };
        let path = ctx.blob_path(&blob_ref.hash, &blob_ref.mime_type);
        let data = ctx.backend.read_bytes(&path).await?;
        resolved.insert(id, ResolvedValue::BlobData(reelforge_store::BlobInput { data, mime_type: blob_ref.mime_type }));
    }
    Ok(())
}
