//! Producer graph reduction (§4.4) and topology layering (§4.5): turns a
//! [`reelforge_expand::CanonicalBlueprint`] into a DAG of producer jobs
//! ready for the planner.

mod catalog;
mod model;
mod topology;

pub use catalog::{ProducerCatalog, ProducerCatalogBuilder, ProducerCatalogEntry};
pub use model::{InputCondition, JobContext, JobExtras, JobSchema, ProducerEdge, ProducerGraph, ProducerJob};
pub use topology::{assign_layers, Topology};

use std::collections::{BTreeMap, BTreeSet};

use reelforge_canon::format_producer_alias;
use reelforge_expand::CanonicalBlueprint;
use reelforge_graph::{BlueprintGraph, NodeKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("duplicate producer alias '{0}'")]
    DuplicateProducerAlias(String),

    #[error("unknown producer alias '{0}'")]
    UnknownProducerAlias(String),

    #[error("unknown node '{0}' in canonical blueprint")]
    UnknownNode(String),
}

/// Reduce a [`CanonicalBlueprint`] to a [`ProducerGraph`], resolving every
/// producer instance against `catalog`.
#[tracing::instrument(skip(graph, cb, catalog))]
pub fn build_producer_graph(
    graph: &BlueprintGraph,
    cb: &CanonicalBlueprint,
    catalog: &ProducerCatalog,
) -> Result<ProducerGraph, ProducerError> {
    let mut jobs: BTreeMap<String, ProducerJob> = BTreeMap::new();

    for instance in cb.nodes.values().filter(|n| n.kind == NodeKind::Producer) {
        let base = graph
            .nodes
            .get(&instance.base_node_id)
            .ok_or_else(|| ProducerError::UnknownNode(instance.base_node_id.clone()))?;
        let producer_meta = base.producer.clone().unwrap_or_default();

        let namespace_path: Vec<&str> = base.namespace_path.iter().map(String::as_str).collect();
        let producer_alias = format_producer_alias(&namespace_path, &base.name);
        let entry = catalog
            .get(&producer_alias)
            .ok_or_else(|| ProducerError::UnknownProducerAlias(producer_alias.clone()))?;

        let incoming: Vec<_> = cb.edges.iter().filter(|e| e.to == instance.id).collect();
        let outgoing: Vec<_> = cb.edges.iter().filter(|e| e.from == instance.id).collect();

        let mut inputs: BTreeSet<String> = incoming.iter().map(|e| e.from.clone()).collect();
        for key in &entry.selection_input_keys {
            inputs.insert(format!("Input:{producer_alias}.{key}"));
        }
        for key in &entry.config_input_paths {
            inputs.insert(format!("Input:{producer_alias}.{key}"));
        }

        let produces: Vec<String> = outgoing
            .iter()
            .filter(|e| cb.nodes.get(&e.to).map(|n| n.kind) == Some(NodeKind::Artifact))
            .map(|e| e.to.clone())
            .collect();

        let input_bindings = cb.input_bindings.get(&instance.id).cloned().unwrap_or_default();

        let fan_in = cb
            .fan_in
            .iter()
            .filter(|(id, _)| inputs.contains(*id))
            .map(|(id, desc)| (id.clone(), desc.clone()))
            .collect();

        let mut input_conditions = BTreeMap::new();
        for edge in &incoming {
            if let Some(condition) = &edge.conditions {
                input_conditions.insert(
                    edge.from.clone(),
                    InputCondition { condition: condition.clone(), indices: instance.indices.clone() },
                );
            }
        }

        let sdk_mapping = entry.sdk_mapping.clone().or_else(|| producer_meta.sdk_mapping.clone());

        let schema = if entry.input_schema.is_some() || entry.output_schema.is_some() {
            Some(JobSchema { input: entry.input_schema.clone(), output: entry.output_schema.clone() })
        } else {
            None
        };

        jobs.insert(
            instance.id.clone(),
            ProducerJob {
                job_id: instance.id.clone(),
                producer: producer_alias.clone(),
                provider: entry.provider.clone(),
                provider_model: entry.provider_model.clone(),
                rate_key: entry.rate_key.clone(),
                inputs: inputs.into_iter().collect(),
                produces,
                context: JobContext {
                    namespace_path: base.namespace_path.clone(),
                    indices: instance.indices.clone(),
                    producer_alias,
                    input_bindings,
                    sdk_mapping,
                    fan_in,
                    input_conditions,
                    extras: JobExtras { schema, ..Default::default() },
                },
            },
        );
    }

    let edges = derive_producer_edges(cb, &jobs);

    tracing::debug!(jobs = jobs.len(), edges = edges.len(), "built producer graph");
    Ok(ProducerGraph { jobs, edges })
}

/// Producer→Artifact→Producer edges, plus edges implied by input bindings
/// whose resolved source is an `Artifact:` id, deduplicated.
fn derive_producer_edges(cb: &CanonicalBlueprint, jobs: &BTreeMap<String, ProducerJob>) -> Vec<ProducerEdge> {
    let mut producer_of_artifact: BTreeMap<&str, &str> = BTreeMap::new();
    for job in jobs.values() {
        for artefact_id in &job.produces {
            producer_of_artifact.insert(artefact_id.as_str(), job.job_id.as_str());
        }
    }

    let mut seen = BTreeSet::new();
    let mut edges = Vec::new();
    let mut push_edge = |from: &str, to: &str| {
        if from == to {
            return;
        }
        let key = (from.to_string(), to.to_string());
        if seen.insert(key) {
            edges.push(ProducerEdge { from: from.to_string(), to: to.to_string() });
        }
    };

    for job in jobs.values() {
        for input_id in &job.inputs {
            if let Some(&producer) = producer_of_artifact.get(input_id.as_str()) {
                push_edge(producer, &job.job_id);
            }
        }
        for source_id in job.context.input_bindings.values() {
            if cb.nodes.get(source_id).map(|n| n.kind) == Some(NodeKind::Artifact) {
                if let Some(&producer) = producer_of_artifact.get(source_id.as_str()) {
                    push_edge(producer, &job.job_id);
                }
            }
        }
        // A fan-in target input (e.g. `Input:Compositor.Images`) is itself
        // the job's declared input, but its individual members are the
        // `Artifact:` ids that actually gate readiness — without this, a
        // job fed only through a fan-in edge would never be placed in a
        // layer after the producers of the artefacts it fans in.
        for descriptor in job.context.fan_in.values() {
            for member in &descriptor.members {
                if let Some(&producer) = producer_of_artifact.get(member.id.as_str()) {
                    push_edge(producer, &job.job_id);
                }
            }
        }
    }

    edges
}
