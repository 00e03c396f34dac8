//! The producer graph: a DAG of producer jobs reduced from a
//! [`reelforge_expand::CanonicalBlueprint`] (§4.4).

use std::collections::BTreeMap;

use reelforge_blueprint::EdgeConditionDefinition;
use reelforge_expand::FanInDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputCondition {
    pub condition: EdgeConditionDefinition,
    pub indices: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobExtras {
    pub schema: Option<JobSchema>,
    /// Runtime-resolved input values, folded in by the runner just before
    /// invoking `Produce`; absent on a freshly-built [`ProducerGraph`].
    pub resolved_inputs: Option<serde_json::Value>,
    /// Runtime-resolved `Artifact:` blob paths, folded in alongside
    /// `resolved_inputs`; absent on a freshly-built [`ProducerGraph`].
    pub asset_blob_paths: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchema {
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobContext {
    pub namespace_path: Vec<String>,
    pub indices: Vec<u64>,
    pub producer_alias: String,
    pub input_bindings: BTreeMap<String, String>,
    pub sdk_mapping: Option<BTreeMap<String, String>>,
    pub fan_in: BTreeMap<String, FanInDescriptor>,
    pub input_conditions: BTreeMap<String, InputCondition>,
    pub extras: JobExtras,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerJob {
    pub job_id: String,
    pub producer: String,
    pub provider: String,
    pub provider_model: String,
    pub rate_key: String,
    pub inputs: Vec<String>,
    pub produces: Vec<String>,
    pub context: JobContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerGraph {
    pub jobs: BTreeMap<String, ProducerJob>,
    pub edges: Vec<ProducerEdge>,
}
