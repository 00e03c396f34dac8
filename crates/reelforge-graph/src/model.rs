use std::collections::BTreeMap;
use std::fmt;

use reelforge_blueprint::EdgeConditionDefinition;
use reelforge_canon::{IdKind, OwnedDimensionSelector};
use serde::{Deserialize, Serialize};

/// Whether a qualified dimension symbol is shared across every node in a
/// namespace (declared via `foo[sym].bar`) or private to one node
/// (declared via that node's own `countInput` or a direct reference
/// `bar[sym]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionScope {
    Namespace,
    Local,
}

impl fmt::Display for DimensionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => f.write_str("namespace"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// A fully qualified dimension symbol: `nodeId::scope:scopeKey:ordinal:rawLabel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedDimensionSymbol {
    pub node_id: String,
    pub scope: DimensionScope,
    pub scope_key: String,
    pub ordinal: usize,
    pub raw_label: String,
}

impl fmt::Display for QualifiedDimensionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}:{}:{}:{}",
            self.node_id, self.scope, self.scope_key, self.ordinal, self.raw_label
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    InputSource,
    Artifact,
    Producer,
}

impl From<NodeKind> for IdKind {
    fn from(value: NodeKind) -> Self {
        match value {
            NodeKind::InputSource => IdKind::Input,
            NodeKind::Artifact => IdKind::Artifact,
            NodeKind::Producer => IdKind::Producer,
        }
    }
}

/// Artefact-specific metadata carried by an `Artifact` node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtefactMeta {
    pub required: bool,
    pub count_input: Option<String>,
    pub count_input_offset: u64,
    /// Set on a synthetic node produced by JSON-schema decomposition
    /// (§4.2): the dimension label substituted inline into this node's
    /// name placeholder.
    pub decomposed_from: Option<String>,
}

/// Producer-specific metadata carried by a `Producer` node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerMeta {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub models: Vec<(String, String)>,
    pub sdk_mapping: Option<BTreeMap<String, String>>,
}

/// A node in the unexpanded blueprint graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Canonical, unindexed id: `Kind:ns1.ns2.Name`.
    pub id: String,
    pub kind: NodeKind,
    pub namespace_path: Vec<String>,
    pub name: String,
    pub dimensions: Vec<QualifiedDimensionSymbol>,
    pub artefact: Option<ArtefactMeta>,
    pub producer: Option<ProducerMeta>,
    /// Set for an `Input` node materialised by constant-indexed reference
    /// (§4.2 pass three), e.g. `ReferenceImages[0]`: the literal index
    /// chosen, not a dimension.
    pub constant_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    /// Selectors aligned with the `from` node's `dimensions`, in order.
    /// `None` at a position means that dimension is unconstrained by this
    /// edge (it is not referenced at that position).
    pub from_selectors: Vec<Option<OwnedDimensionSelector>>,
    pub to_selectors: Vec<Option<OwnedDimensionSelector>>,
    pub conditions: Option<EdgeConditionDefinition>,
    pub group_by: Option<String>,
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDef {
    pub raw_label: String,
    pub count_input: String,
    pub offset: u64,
}

/// The unexpanded blueprint graph: nodes with declared (but unsized)
/// dimensions, edges with dimension selectors, loop metadata, and
/// dimension lineage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Loop definitions keyed by the dot-joined namespace path that
    /// declares them.
    pub loops: BTreeMap<String, Vec<LoopDef>>,
    /// `symbol -> parent symbol`, both rendered via `Display`. `None` means
    /// the symbol has no derived parent (it is sized directly).
    pub dimension_lineage: BTreeMap<String, Option<String>>,
}
