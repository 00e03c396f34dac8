//! The expanded, flat canonical blueprint (§3 "CanonicalBlueprint").

use std::collections::BTreeMap;

use reelforge_blueprint::EdgeConditionDefinition;
use reelforge_graph::NodeKind;
use serde::{Deserialize, Serialize};

/// One concrete (node, index-tuple) instance of a [`reelforge_graph::GraphNode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalNodeInstance {
    pub id: String,
    pub base_node_id: String,
    pub kind: NodeKind,
    /// Concrete index values, in the same order as the base node's
    /// `dimensions` list.
    pub indices: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEdge {
    pub from: String,
    pub to: String,
    /// The declaring (collapsed) edge's condition tree, carried through
    /// unchanged to every instance of this edge so the producer graph and
    /// runner can gate on it.
    pub conditions: Option<EdgeConditionDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanInMember {
    pub id: String,
    pub group: usize,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanInDescriptor {
    pub group_by: Option<String>,
    pub order_by: Option<String>,
    pub members: Vec<FanInMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalBlueprint {
    pub nodes: BTreeMap<String, CanonicalNodeInstance>,
    pub edges: Vec<CanonicalEdge>,
    /// `producerId -> (alias -> canonicalSourceId)`.
    pub input_bindings: BTreeMap<String, BTreeMap<String, String>>,
    /// `targetInputId -> FanInDescriptor`.
    pub fan_in: BTreeMap<String, FanInDescriptor>,
}
