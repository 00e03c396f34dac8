//! The incremental execution planner (§4.6): diffs the current manifest
//! against the latest event-log projections and a reduced [`reelforge_producer::ProducerGraph`]
//! to decide which producer jobs must re-run, then lays them out into
//! topologically-ordered layers ready for the runner.

pub mod dirty;
mod model;
mod planner;

pub use dirty::{artefact_input_ids, base_id, dirty_artefacts, dirty_inputs, effective_inputs, hash_job_input_contents, EffectiveInput};
pub use model::{ArtifactRegeneration, ExecutionPlan, JobReason, PendingEdit, PlanExplanation, PlanRequest};
pub use planner::compute_plan;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("producer graph has a cycle; cannot assign topological layers")]
    CyclicDependency,

    #[error("artifact regeneration references unknown source job '{0}'")]
    UnknownSourceJob(String),

    #[error(transparent)]
    Hash(#[from] reelforge_hash::HashError),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use reelforge_blueprint::{
        ArtefactDecl, BlueprintDocument, BlueprintTree, DocumentMeta, EdgeDecl, InputDecl, ProducerDecl, ValueType,
    };
    use reelforge_events::{ArtefactEvent, ArtefactOutput, ArtefactStatus, InputEvent};
    use reelforge_graph::build_blueprint_graph;
    use reelforge_manifest::{Manifest, ManifestArtefactEntry, ManifestInputEntry};
    use reelforge_producer::{ProducerCatalog, ProducerCatalogEntry, ProducerGraph};
    use reelforge_store::BlobRef;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn doc(name: &str) -> BlueprintDocument {
        BlueprintDocument { meta: DocumentMeta { id: name.into(), name: name.into() }, ..Default::default() }
    }

    fn catalog_entry(provider: &str) -> ProducerCatalogEntry {
        ProducerCatalogEntry {
            provider: provider.into(),
            provider_model: "v1".into(),
            rate_key: format!("{provider}:v1"),
            sdk_mapping: None,
            selection_input_keys: Vec::new(),
            config_input_paths: Vec::new(),
            input_schema: None,
            output_schema: None,
        }
    }

    /// Topic -> ScriptWriter -> Script -> Narrator -> Audio.
    fn two_stage_graph() -> ProducerGraph {
        let mut root = doc("root");
        root.inputs.push(InputDecl { name: "Topic".into(), ty: ValueType::String, required: true, default: None, fan_in: false });
        root.artefacts.push(ArtefactDecl { name: "Script".into(), ty: ValueType::String, required: true, count_input: None, count_input_offset: 0, schema: None });
        root.artefacts.push(ArtefactDecl { name: "Audio".into(), ty: ValueType::String, required: true, count_input: None, count_input_offset: 0, schema: None });
        root.producers.push(ProducerDecl { name: "ScriptWriter".into(), ..Default::default() });
        root.producers.push(ProducerDecl { name: "Narrator".into(), ..Default::default() });
        root.edges.push(EdgeDecl { from: "Topic".into(), to: "ScriptWriter".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "ScriptWriter".into(), to: "Script".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "Script".into(), to: "Narrator".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "Narrator".into(), to: "Audio".into(), conditions: None, group_by: None, order_by: None });
        let tree = BlueprintTree { root };
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        values.insert("Input:Topic".into(), json!("space"));
        let cb = reelforge_expand::expand_blueprint(&tree, &graph, &values).unwrap();
        let catalog = ProducerCatalog::builder()
            .register("ScriptWriter", catalog_entry("openai"))
            .unwrap()
            .register("Narrator", catalog_entry("replicate"))
            .unwrap()
            .build();
        reelforge_producer::build_producer_graph(&graph, &cb, &catalog).unwrap()
    }

    fn input_event(id: &str, value: serde_json::Value) -> InputEvent {
        InputEvent { id: id.into(), hash: reelforge_hash::hash_value(&value).unwrap(), value: Some(value), created_at: now() }
    }

    fn succeeded_artefact(id: &str, produced_by: &str, inputs_hash: &str) -> ArtefactEvent {
        ArtefactEvent {
            artefact_id: id.into(),
            revision: "rev-0001".into(),
            inputs_hash: inputs_hash.into(),
            output: ArtefactOutput { blob: Some(BlobRef { hash: format!("blob-{id}"), size: 10, mime_type: "text/plain".into() }) },
            status: ArtefactStatus::Succeeded,
            produced_by: produced_by.into(),
            diagnostics: None,
            created_at: now(),
        }
    }

    fn manifest_entry_for(event: &ArtefactEvent) -> ManifestArtefactEntry {
        ManifestArtefactEntry {
            hash: reelforge_hash::derive_artefact_hash(&reelforge_hash::ArtefactHashInput {
                artefact_id: &event.artefact_id,
                inputs_hash: &event.inputs_hash,
                status: "succeeded",
                blob_hash: event.output.blob.as_ref().map(|b| b.hash.as_str()),
                blob_size: event.output.blob.as_ref().map(|b| b.size),
                blob_mime_type: event.output.blob.as_ref().map(|b| b.mime_type.as_str()),
            })
            .unwrap(),
            blob: event.output.blob.clone(),
            produced_by: event.produced_by.clone(),
            status: ArtefactStatus::Succeeded,
            inputs_hash: event.inputs_hash.clone(),
            diagnostics: None,
            created_at: now(),
        }
    }

    #[test]
    fn initial_manifest_marks_every_job_dirty() {
        let blueprint = two_stage_graph();
        let latest_inputs = BTreeMap::new();
        let latest_artefacts = BTreeMap::new();
        let manifest = Manifest::empty(now());

        let plan = compute_plan(&PlanRequest {
            manifest: &manifest,
            latest_inputs: &latest_inputs,
            latest_artefacts: &latest_artefacts,
            blueprint: &blueprint,
            target_revision: "rev-0001".into(),
            pending_edits: Vec::new(),
            re_run_from: None,
            artifact_regenerations: Vec::new(),
            up_to_layer: None,
            collect_explanation: true,
            created_at: now(),
        })
        .unwrap();

        assert_eq!(plan.job_count(), 2);
        assert_eq!(plan.layers.len(), 2);
        assert_eq!(plan.layers[0][0].job_id, "Producer:ScriptWriter");
        assert_eq!(plan.layers[1][0].job_id, "Producer:Narrator");
        let explanation = plan.explanation.unwrap();
        assert!(matches!(
            explanation.job_reasons.iter().find(|(id, _)| id == "Producer:ScriptWriter").unwrap().1,
            JobReason::Initial
        ));
    }

    #[test]
    fn up_to_date_manifest_produces_empty_plan() {
        let blueprint = two_stage_graph();

        let topic = input_event("Input:Topic", json!("space"));
        let mut latest_inputs = BTreeMap::new();
        latest_inputs.insert(topic.id.clone(), topic.clone());

        let script_job = &blueprint.jobs["Producer:ScriptWriter"];
        let script_hash = dirty::hash_job_input_contents(
            script_job,
            &dirty::effective_inputs(&latest_inputs, &[]).unwrap(),
            &Manifest::empty(now()),
        )
        .unwrap();
        let script_event = succeeded_artefact("Artifact:Script", "Producer:ScriptWriter", &script_hash);

        let mut manifest = Manifest::empty(now());
        manifest.revision = "rev-0001".into();
        manifest.inputs.insert(topic.id.clone(), ManifestInputEntry { hash: topic.hash.clone(), value: topic.value.clone() });
        manifest.artefacts.insert(script_event.artefact_id.clone(), manifest_entry_for(&script_event));

        let narrator_job = &blueprint.jobs["Producer:Narrator"];
        let narrator_hash =
            dirty::hash_job_input_contents(narrator_job, &dirty::effective_inputs(&latest_inputs, &[]).unwrap(), &manifest).unwrap();
        let audio_event = succeeded_artefact("Artifact:Audio", "Producer:Narrator", &narrator_hash);
        manifest.artefacts.insert(audio_event.artefact_id.clone(), manifest_entry_for(&audio_event));

        let mut latest_artefacts = BTreeMap::new();
        latest_artefacts.insert(script_event.artefact_id.clone(), script_event);
        latest_artefacts.insert(audio_event.artefact_id.clone(), audio_event);

        let plan = compute_plan(&PlanRequest {
            manifest: &manifest,
            latest_inputs: &latest_inputs,
            latest_artefacts: &latest_artefacts,
            blueprint: &blueprint,
            target_revision: "rev-0002".into(),
            pending_edits: Vec::new(),
            re_run_from: None,
            artifact_regenerations: Vec::new(),
            up_to_layer: None,
            collect_explanation: false,
            created_at: now(),
        })
        .unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.job_count(), 0);
    }

    #[test]
    fn surgical_regeneration_targets_only_source_and_downstream() {
        let blueprint = two_stage_graph();
        let manifest = Manifest::empty(now());
        let latest_inputs = BTreeMap::new();
        let latest_artefacts = BTreeMap::new();

        let plan = compute_plan(&PlanRequest {
            manifest: &manifest,
            latest_inputs: &latest_inputs,
            latest_artefacts: &latest_artefacts,
            blueprint: &blueprint,
            target_revision: "rev-0003".into(),
            pending_edits: Vec::new(),
            re_run_from: None,
            artifact_regenerations: vec![ArtifactRegeneration {
                source_job_id: "Producer:Narrator".into(),
                target_artifact_id: "Artifact:Audio".into(),
            }],
            up_to_layer: None,
            collect_explanation: true,
            created_at: now(),
        })
        .unwrap();

        // every job is already dirty (initial manifest), so this just
        // exercises that the surgical target is included without blowing up.
        assert!(plan.job_count() >= 1);
        assert!(plan.layers.iter().flatten().any(|j| j.job_id == "Producer:Narrator"));
    }

    #[test]
    fn re_run_from_forces_inclusion_of_later_layers() {
        let blueprint = two_stage_graph();
        let manifest = Manifest::empty(now());
        let latest_inputs = BTreeMap::new();
        let latest_artefacts = BTreeMap::new();

        let plan = compute_plan(&PlanRequest {
            manifest: &manifest,
            latest_inputs: &latest_inputs,
            latest_artefacts: &latest_artefacts,
            blueprint: &blueprint,
            target_revision: "rev-0004".into(),
            pending_edits: Vec::new(),
            re_run_from: Some(1),
            artifact_regenerations: Vec::new(),
            up_to_layer: None,
            collect_explanation: true,
            created_at: now(),
        })
        .unwrap();

        assert!(plan.layers[1].iter().any(|j| j.job_id == "Producer:Narrator"));
    }
}
