//! `computePlan` (§4.6): the incremental planner's decision logic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use reelforge_producer::{ProducerGraph, ProducerJob};

use crate::dirty::{self, EffectiveInput};
use crate::model::{ExecutionPlan, JobReason, PlanExplanation, PlanRequest};
use crate::PlanError;

/// Per-job reason bookkeeping kept only while `collect_explanation` is set;
/// cheap enough to always compute, gated at the point it's attached to the
/// returned [`ExecutionPlan`].
struct Decision {
    initial_dirty: BTreeMap<String, JobReason>,
    propagated: BTreeMap<String, String>,
}

pub fn compute_plan(request: &PlanRequest<'_>) -> Result<ExecutionPlan, PlanError> {
    let topology = reelforge_producer::assign_layers(
        &request.blueprint.jobs.keys().cloned().collect::<Vec<_>>(),
        &request.blueprint.edges,
    );
    if topology.has_cycle {
        return Err(PlanError::CyclicDependency);
    }

    let effective = dirty::effective_inputs(request.latest_inputs, &request.pending_edits)?;
    let dirty_inputs = dirty::dirty_inputs(&effective, request.manifest);
    let dirty_artefacts = dirty::dirty_artefacts(request.latest_artefacts, request.manifest)?;

    let decision = if request.manifest.is_initial() {
        Decision {
            initial_dirty: request
                .blueprint
                .jobs
                .keys()
                .map(|id| (id.clone(), JobReason::Initial))
                .collect(),
            propagated: BTreeMap::new(),
        }
    } else {
        initial_dirty_jobs(request.blueprint, &effective, request.manifest, &dirty_inputs, &dirty_artefacts)?
    };

    let propagated = propagate(request.blueprint, decision.initial_dirty.keys().cloned().collect());

    let mut included: BTreeSet<String> = decision.initial_dirty.keys().cloned().collect();
    included.extend(propagated.keys().cloned());

    let mut forced_reasons: BTreeMap<String, JobReason> = BTreeMap::new();

    if !request.artifact_regenerations.is_empty() {
        for regen in &request.artifact_regenerations {
            if !request.blueprint.jobs.contains_key(&regen.source_job_id) {
                return Err(PlanError::UnknownSourceJob(regen.source_job_id.clone()));
            }
            for job_id in downstream_closure(request.blueprint, &regen.source_job_id) {
                if !included.contains(&job_id) {
                    forced_reasons
                        .entry(job_id.clone())
                        .or_insert_with(|| JobReason::SurgicalTarget { source_job_id: regen.source_job_id.clone() });
                    included.insert(job_id);
                }
            }
        }
    } else if let Some(layer) = request.re_run_from {
        for (job_id, &job_layer) in &topology.layer_assignments {
            if job_layer >= layer && !included.contains(job_id) {
                forced_reasons.insert(job_id.clone(), JobReason::ReRunFromLayer { layer });
                included.insert(job_id.clone());
            }
        }
    }

    if let Some(up_to) = request.up_to_layer {
        included.retain(|job_id| topology.layer_assignments.get(job_id).is_some_and(|&l| l <= up_to));
    }

    let mut layers: Vec<Vec<ProducerJob>> = vec![Vec::new(); topology.layer_count];
    for (job_id, job) in &request.blueprint.jobs {
        if !included.contains(job_id) {
            continue;
        }
        let layer = topology.layer_assignments[job_id];
        layers[layer].push(job.clone());
    }
    for layer in &mut layers {
        layer.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    }
    while layers.last().is_some_and(|l| l.is_empty()) {
        layers.pop();
    }

    let explanation = request.collect_explanation.then(|| {
        let mut job_reasons: Vec<(String, JobReason)> = decision
            .initial_dirty
            .iter()
            .map(|(id, reason)| (id.clone(), reason.clone()))
            .chain(propagated.iter().map(|(id, from)| (id.clone(), JobReason::Propagated { from: from.clone() })))
            .chain(forced_reasons.iter().map(|(id, reason)| (id.clone(), reason.clone())))
            .collect();
        job_reasons.sort_by(|a, b| a.0.cmp(&b.0));

        PlanExplanation {
            dirty_inputs: dirty_inputs.iter().cloned().collect(),
            dirty_artefacts: dirty_artefacts.iter().cloned().collect(),
            job_reasons,
            initial_dirty_jobs: decision.initial_dirty.keys().cloned().collect(),
            propagated_jobs: propagated.keys().cloned().collect(),
            surgical_targets: (!request.artifact_regenerations.is_empty())
                .then(|| request.artifact_regenerations.clone()),
        }
    });

    Ok(ExecutionPlan {
        revision: request.target_revision.clone(),
        manifest_base_hash: request.manifest.hash()?,
        layers,
        created_at: request.created_at,
        blueprint_layer_count: topology.layer_count,
        explanation,
    })
}

/// §4.6 step 2: a job is dirty if it produces something missing from the
/// manifest, touches a dirty input or artefact (including fan-in members),
/// or its recomputed input-contents hash no longer matches what's recorded.
fn initial_dirty_jobs(
    blueprint: &ProducerGraph,
    effective: &BTreeMap<String, EffectiveInput>,
    manifest: &reelforge_manifest::Manifest,
    dirty_inputs: &BTreeSet<String>,
    dirty_artefacts: &BTreeSet<String>,
) -> Result<Decision, PlanError> {
    let mut initial_dirty = BTreeMap::new();

    for job in blueprint.jobs.values() {
        let missing: Vec<String> =
            job.produces.iter().filter(|id| !manifest.artefacts.contains_key(id.as_str())).cloned().collect();
        if !missing.is_empty() {
            initial_dirty.insert(job.job_id.clone(), JobReason::ProducesMissing { missing });
            continue;
        }

        let touched_inputs: Vec<String> = job
            .inputs
            .iter()
            .filter(|id| reelforge_canon::is_canonical_input_id(id))
            .filter(|id| dirty_inputs.contains(dirty::base_id(id).as_str()) || dirty_inputs.contains(id.as_str()))
            .cloned()
            .collect();
        if !touched_inputs.is_empty() {
            initial_dirty.insert(job.job_id.clone(), JobReason::TouchesDirtyInput { inputs: touched_inputs });
            continue;
        }

        let touched_artefacts: Vec<String> = dirty::artefact_input_ids(job)
            .into_iter()
            .filter(|id| dirty_artefacts.contains(id))
            .collect();
        if !touched_artefacts.is_empty() {
            initial_dirty.insert(job.job_id.clone(), JobReason::TouchesDirtyArtefact { artefacts: touched_artefacts });
            continue;
        }

        let fresh_hash = dirty::hash_job_input_contents(job, effective, manifest)?;
        let stale: Vec<String> = job
            .produces
            .iter()
            .filter(|id| manifest.artefacts.get(id.as_str()).is_some_and(|e| e.inputs_hash != fresh_hash))
            .cloned()
            .collect();
        if !stale.is_empty() {
            initial_dirty.insert(job.job_id.clone(), JobReason::InputsHashChanged { stale });
        }
    }

    Ok(Decision { initial_dirty, propagated: BTreeMap::new() })
}

/// BFS forward from the initial dirty set along producer edges (§4.6 step
/// 3). Returns newly-reached job ids mapped to the first predecessor that
/// pulled them in.
fn propagate(blueprint: &ProducerGraph, seeds: BTreeSet<String>) -> BTreeMap<String, String> {
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in &blueprint.edges {
        successors.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut propagated = BTreeMap::new();
    let mut visited: BTreeSet<String> = seeds.clone();
    let mut queue: VecDeque<String> = seeds.into_iter().collect();

    while let Some(current) = queue.pop_front() {
        if let Some(nexts) = successors.get(current.as_str()) {
            for &next in nexts {
                if visited.insert(next.to_string()) {
                    propagated.insert(next.to_string(), current.clone());
                    queue.push_back(next.to_string());
                }
            }
        }
    }

    propagated
}

/// Every job reachable forward from (and including) `source_job_id`, used
/// for surgical-regeneration requests (§4.6 step 4).
fn downstream_closure(blueprint: &ProducerGraph, source_job_id: &str) -> BTreeSet<String> {
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in &blueprint.edges {
        successors.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(source_job_id.to_string());
    queue.push_back(source_job_id.to_string());

    while let Some(current) = queue.pop_front() {
        if let Some(nexts) = successors.get(current.as_str()) {
            for &next in nexts {
                if visited.insert(next.to_string()) {
                    queue.push_back(next.to_string());
                }
            }
        }
    }

    visited
}
