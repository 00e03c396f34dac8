//! The canonical expander (§4.3): dimension sizing, cartesian instance
//! enumeration, edge expansion, fan-in materialisation, and input alias
//! chain collapse. Pure function of a [`BlueprintTree`] + [`BlueprintGraph`]
//! + concrete input values.

mod model;
mod sizing;

pub use model::{
    CanonicalBlueprint, CanonicalEdge, CanonicalNodeInstance, FanInDescriptor, FanInMember,
};
pub use sizing::{resolve_dimension_sizes, DimKey};

use std::collections::BTreeMap;

use reelforge_blueprint::{BlueprintTree, EdgeConditionDefinition};
use reelforge_canon::OwnedDimensionSelector;
use reelforge_graph::{BlueprintGraph, GraphEdge, GraphNode, NodeKind};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("missing dimension size for symbol '{0}'")]
    MissingDimensionSize(String),

    #[error("invalid dimension-sizing input value for '{0}'")]
    InvalidDimensionSize(String),

    #[error("conflicting sizes for dimension '{symbol}': {first} vs {second}")]
    ConflictingDimensionSize { symbol: String, first: u64, second: u64 },

    #[error("multiple upstream sources for non-fan-in input '{0}'")]
    MultipleUpstreamInputs(String),

    #[error("alias cycle detected at '{0}'")]
    AliasCycleDetected(String),

    #[error("graph expansion error: {0}")]
    GraphExpansionError(String),
}

/// Expand a [`BlueprintGraph`] (built from `tree`) into a flat
/// [`CanonicalBlueprint`] given concrete input values, keyed the same way as
/// event-log input records (`"Input:Name"` or the bare qualified name).
#[tracing::instrument(skip(tree, graph, input_values))]
pub fn expand_blueprint(
    tree: &BlueprintTree,
    graph: &BlueprintGraph,
    input_values: &BTreeMap<String, Value>,
) -> Result<CanonicalBlueprint, ExpandError> {
    let sizes = resolve_dimension_sizes(graph, input_values)?;

    validate_no_unsolicited_fan_in(tree, graph)?;
    let (collapsed_edges, input_bindings) = collapse_input_aliases(tree, graph)?;

    let mut cb = CanonicalBlueprint::default();

    let mut instances_by_node: BTreeMap<String, Vec<(String, Vec<u64>)>> = BTreeMap::new();
    for node in graph.nodes.values() {
        let instances = enumerate_instances(node, &sizes)?;
        for (id, indices) in &instances {
            cb.nodes.insert(
                id.clone(),
                CanonicalNodeInstance {
                    id: id.clone(),
                    base_node_id: node.id.clone(),
                    kind: node.kind,
                    indices: indices.clone(),
                },
            );
        }
        instances_by_node.insert(node.id.clone(), instances);
    }

    for edge in &collapsed_edges {
        let from_node = graph
            .nodes
            .get(&edge.from)
            .ok_or_else(|| ExpandError::GraphExpansionError(format!("unknown node '{}'", edge.from)))?;
        let to_node = graph
            .nodes
            .get(&edge.to)
            .ok_or_else(|| ExpandError::GraphExpansionError(format!("unknown node '{}'", edge.to)))?;
        let from_instances = instances_by_node
            .get(&edge.from)
            .ok_or_else(|| ExpandError::GraphExpansionError(format!("unsized node '{}'", edge.from)))?;
        let to_instances = instances_by_node
            .get(&edge.to)
            .ok_or_else(|| ExpandError::GraphExpansionError(format!("unsized node '{}'", edge.to)))?;

        for (from_id, from_indices) in from_instances {
            for (to_id, to_indices) in to_instances {
                if from_id == to_id {
                    continue;
                }
                if edge_aligns(edge, from_node, from_indices, to_node, to_indices) {
                    cb.edges.push(CanonicalEdge {
                        from: from_id.clone(),
                        to: to_id.clone(),
                        conditions: edge.conditions.clone(),
                    });
                }
            }
        }
    }

    cb.input_bindings = input_bindings;
    cb.fan_in = materialise_fan_in(tree, graph, &collapsed_edges, &instances_by_node)?;

    tracing::debug!(nodes = cb.nodes.len(), edges = cb.edges.len(), fan_in = cb.fan_in.len(), "expanded canonical blueprint");
    Ok(cb)
}

fn cartesian(sizes: &[u64]) -> Vec<Vec<u64>> {
    let mut combos: Vec<Vec<u64>> = vec![Vec::new()];
    for &size in sizes {
        let mut next = Vec::with_capacity(combos.len() * size.max(1) as usize);
        for combo in &combos {
            for i in 0..size {
                let mut extended = combo.clone();
                extended.push(i);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

fn node_dim_sizes(node: &GraphNode, sizes: &BTreeMap<DimKey, u64>) -> Result<Vec<u64>, ExpandError> {
    node.dimensions
        .iter()
        .map(|dim| {
            sizes
                .get(&(dim.scope_key.clone(), dim.raw_label.clone()))
                .copied()
                .ok_or_else(|| ExpandError::MissingDimensionSize(dim.raw_label.clone()))
        })
        .collect()
}

fn build_instance_id(node: &GraphNode, indices: &[u64]) -> String {
    if let Some(artefact) = &node.artefact {
        if let Some(label) = &artefact.decomposed_from {
            if let Some(pos) = node.dimensions.iter().position(|d| &d.raw_label == label) {
                let placeholder = format!("[{label}]");
                let mut id = node.id.replacen(&placeholder, &format!("[{}]", indices[pos]), 1);
                for (i, ix) in indices.iter().enumerate() {
                    if i != pos {
                        id.push_str(&format!("[{ix}]"));
                    }
                }
                return id;
            }
        }
    }
    let mut id = node.id.clone();
    for ix in indices {
        id.push_str(&format!("[{ix}]"));
    }
    id
}

fn enumerate_instances(
    node: &GraphNode,
    sizes: &BTreeMap<DimKey, u64>,
) -> Result<Vec<(String, Vec<u64>)>, ExpandError> {
    let dim_sizes = node_dim_sizes(node, sizes)?;
    Ok(cartesian(&dim_sizes)
        .into_iter()
        .map(|indices| (build_instance_id(node, &indices), indices))
        .collect())
}

fn selector_effective(sel: &OwnedDimensionSelector, node: &GraphNode, indices: &[u64]) -> Option<i64> {
    match sel {
        OwnedDimensionSelector::Const { value } => Some(*value as i64),
        OwnedDimensionSelector::Loop { symbol, offset } => {
            let pos = node.dimensions.iter().position(|d| &d.raw_label == symbol)?;
            Some(indices[pos] as i64 - offset)
        }
    }
}

fn edge_aligns(
    edge: &GraphEdge,
    from_node: &GraphNode,
    from_indices: &[u64],
    to_node: &GraphNode,
    to_indices: &[u64],
) -> bool {
    for (from_sel, to_sel) in edge.from_selectors.iter().zip(edge.to_selectors.iter()) {
        if let (Some(f), Some(t)) = (from_sel, to_sel) {
            let fv = selector_effective(f, from_node, from_indices);
            let tv = selector_effective(t, to_node, to_indices);
            match (fv, tv) {
                (Some(a), Some(b)) if a == b => {}
                _ => return false,
            }
        }
    }
    true
}

fn is_fan_in(tree: &BlueprintTree, node: &GraphNode) -> bool {
    if node.kind != NodeKind::InputSource {
        return false;
    }
    tree.document_at(&node.namespace_path)
        .map(|doc| doc.inputs.iter().any(|i| i.name == node.name && i.fan_in))
        .unwrap_or(false)
}

fn incoming_edges<'a>(graph: &'a BlueprintGraph, target: &str) -> Vec<&'a GraphEdge> {
    graph.edges.iter().filter(|e| e.to == target).collect()
}

fn validate_no_unsolicited_fan_in(tree: &BlueprintTree, graph: &BlueprintGraph) -> Result<(), ExpandError> {
    for node in graph.nodes.values() {
        if node.kind != NodeKind::InputSource || is_fan_in(tree, node) {
            continue;
        }
        if incoming_edges(graph, &node.id).len() > 1 {
            return Err(ExpandError::MultipleUpstreamInputs(node.id.clone()));
        }
    }
    Ok(())
}

struct AliasResolution {
    terminal: String,
    selectors_from_terminal: Vec<Option<OwnedDimensionSelector>>,
    conditions: Vec<EdgeConditionDefinition>,
}

fn resolve_alias(
    graph: &BlueprintGraph,
    tree: &BlueprintTree,
    id: &str,
    visiting: &mut Vec<String>,
) -> Result<AliasResolution, ExpandError> {
    let node = graph
        .nodes
        .get(id)
        .ok_or_else(|| ExpandError::GraphExpansionError(format!("unknown node '{id}'")))?;

    if node.kind != NodeKind::InputSource || is_fan_in(tree, node) {
        return Ok(AliasResolution { terminal: id.to_string(), selectors_from_terminal: Vec::new(), conditions: Vec::new() });
    }

    let incoming = incoming_edges(graph, id);
    if incoming.is_empty() {
        return Ok(AliasResolution { terminal: id.to_string(), selectors_from_terminal: Vec::new(), conditions: Vec::new() });
    }
    if incoming.len() > 1 {
        return Err(ExpandError::MultipleUpstreamInputs(id.to_string()));
    }
    if visiting.contains(&id.to_string()) {
        return Err(ExpandError::AliasCycleDetected(id.to_string()));
    }

    visiting.push(id.to_string());
    let edge = incoming[0];
    let upstream = resolve_alias(graph, tree, &edge.from, visiting)?;
    visiting.pop();

    let mut conditions = upstream.conditions;
    if let Some(c) = &edge.conditions {
        conditions.push(c.clone());
    }
    let selectors = if upstream.selectors_from_terminal.is_empty() {
        edge.from_selectors.clone()
    } else {
        upstream.selectors_from_terminal
    };

    Ok(AliasResolution { terminal: upstream.terminal, selectors_from_terminal: selectors, conditions })
}

fn merge_conditions(conditions: Vec<EdgeConditionDefinition>) -> Option<EdgeConditionDefinition> {
    match conditions.len() {
        0 => None,
        1 => conditions.into_iter().next(),
        _ => Some(EdgeConditionDefinition::All { all: conditions }),
    }
}

/// Collapse transparent, non-fan-in Input alias chains (§4.3 step 5),
/// returning the edges re-targeted at their terminal real sources plus the
/// accumulated `producer/consumer -> alias -> canonicalSourceId` bindings.
fn collapse_input_aliases(
    tree: &BlueprintTree,
    graph: &BlueprintGraph,
) -> Result<(Vec<GraphEdge>, BTreeMap<String, BTreeMap<String, String>>), ExpandError> {
    let mut new_edges = Vec::with_capacity(graph.edges.len());
    let mut input_bindings: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for edge in &graph.edges {
        let from_node = graph
            .nodes
            .get(&edge.from)
            .ok_or_else(|| ExpandError::GraphExpansionError(format!("unknown node '{}'", edge.from)))?;
        let is_alias_from = from_node.kind == NodeKind::InputSource
            && !is_fan_in(tree, from_node)
            && !incoming_edges(graph, &edge.from).is_empty();

        if !is_alias_from {
            new_edges.push(edge.clone());
            continue;
        }

        let mut visiting = Vec::new();
        let resolved = resolve_alias(graph, tree, &edge.from, &mut visiting)?;

        let mut conditions = resolved.conditions.clone();
        if let Some(c) = &edge.conditions {
            conditions.push(c.clone());
        }

        new_edges.push(GraphEdge {
            from: resolved.terminal.clone(),
            to: edge.to.clone(),
            from_selectors: resolved.selectors_from_terminal.clone(),
            to_selectors: edge.to_selectors.clone(),
            conditions: merge_conditions(conditions),
            group_by: edge.group_by.clone(),
            order_by: edge.order_by.clone(),
        });

        let existing = input_bindings.entry(edge.to.clone()).or_default();
        match existing.get(&from_node.name) {
            Some(prior) if prior != &resolved.terminal => {
                return Err(ExpandError::GraphExpansionError(format!(
                    "conflicting input binding for alias '{}' on '{}'",
                    from_node.name, edge.to
                )));
            }
            _ => {
                existing.insert(from_node.name.clone(), resolved.terminal.clone());
            }
        }
    }

    Ok((new_edges, input_bindings))
}

fn find_group_order_by(
    tree: &BlueprintTree,
    node: &GraphNode,
    fallback_group_by: Option<String>,
    fallback_order_by: Option<String>,
) -> (Option<String>, Option<String>) {
    for (_, doc) in tree.walk() {
        for collector in &doc.collectors {
            if collector.into == node.name {
                return (Some(collector.group_by.clone()), collector.order_by.clone());
            }
        }
    }
    (fallback_group_by, fallback_order_by)
}

fn materialise_fan_in(
    tree: &BlueprintTree,
    graph: &BlueprintGraph,
    collapsed_edges: &[GraphEdge],
    instances_by_node: &BTreeMap<String, Vec<(String, Vec<u64>)>>,
) -> Result<BTreeMap<String, FanInDescriptor>, ExpandError> {
    let mut fan_in = BTreeMap::new();

    for node in graph.nodes.values() {
        if !is_fan_in(tree, node) {
            continue;
        }
        let incoming: Vec<&GraphEdge> = collapsed_edges.iter().filter(|e| e.to == node.id).collect();
        if incoming.is_empty() {
            continue;
        }

        let distinct_sources: Vec<&str> = {
            let mut seen = Vec::new();
            for e in &incoming {
                if !seen.contains(&e.from.as_str()) {
                    seen.push(e.from.as_str());
                }
            }
            seen
        };
        if distinct_sources.len() > 1 {
            let has_collector = tree
                .walk()
                .iter()
                .any(|(_, doc)| doc.collectors.iter().any(|c| c.into == node.name));
            if !has_collector {
                return Err(ExpandError::MultipleUpstreamInputs(node.id.clone()));
            }
        }

        let (group_by, order_by) = find_group_order_by(
            tree,
            node,
            incoming[0].group_by.clone(),
            incoming[0].order_by.clone(),
        );

        let mut members: Vec<FanInMember> = Vec::new();
        for edge in &incoming {
            let Some(source_node) = graph.nodes.get(&edge.from) else { continue };
            let Some(instances) = instances_by_node.get(&edge.from) else { continue };
            for (source_id, indices) in instances {
                let group = group_by
                    .as_ref()
                    .and_then(|label| source_node.dimensions.iter().position(|d| &d.raw_label == label))
                    .map(|pos| indices[pos] as usize)
                    .unwrap_or(0);
                let order = order_by
                    .as_ref()
                    .and_then(|label| source_node.dimensions.iter().position(|d| &d.raw_label == label))
                    .map(|pos| indices[pos] as i64);
                members.push(FanInMember { id: source_id.clone(), group, order });
            }
        }

        // Sort by id first for a deterministic tiebreak, then by the real
        // group/order key (stable sort preserves the id tiebreak).
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members.sort_by_key(|m| (m.group, m.order.unwrap_or(0)));

        fan_in.insert(
            node.id.clone(),
            FanInDescriptor { group_by, order_by, members },
        );
    }

    Ok(fan_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_blueprint::{
        ArtefactDecl, BlueprintDocument, DocumentMeta, EdgeDecl, InputDecl, ValueType,
    };
    use reelforge_graph::build_blueprint_graph;
    use serde_json::json;

    fn doc(name: &str) -> BlueprintDocument {
        BlueprintDocument { meta: DocumentMeta { id: name.into(), name: name.into() }, ..Default::default() }
    }

    fn input(name: &str) -> InputDecl {
        InputDecl { name: name.to_string(), ty: ValueType::String, required: true, default: None, fan_in: false }
    }

    fn scenario_a_tree() -> BlueprintTree {
        let mut root = doc("root");
        root.inputs.push(input("Topic"));
        root.inputs.push(InputDecl {
            name: "NumOfSegments".into(),
            ty: ValueType::Number,
            required: true,
            default: None,
            fan_in: false,
        });
        root.artefacts.push(ArtefactDecl {
            name: "Script".into(),
            ty: ValueType::String,
            required: true,
            count_input: None,
            count_input_offset: 0,
            schema: None,
        });
        root.artefacts.push(ArtefactDecl {
            name: "Audio".into(),
            ty: ValueType::String,
            required: true,
            count_input: Some("NumOfSegments".into()),
            count_input_offset: 0,
            schema: None,
        });
        root.edges.push(EdgeDecl { from: "Topic".into(), to: "Script".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "Script".into(), to: "Audio".into(), conditions: None, group_by: None, order_by: None });
        BlueprintTree { root }
    }

    #[test]
    fn instance_count_equals_product_of_sizes() {
        let tree = scenario_a_tree();
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Topic".to_string(), json!("space"));
        values.insert("Input:NumOfSegments".to_string(), json!(3));

        let cb = expand_blueprint(&tree, &graph, &values).unwrap();
        assert!(cb.nodes.contains_key("Input:Topic"));
        assert!(cb.nodes.contains_key("Artifact:Script"));
        assert!(cb.nodes.contains_key("Artifact:Audio[0]"));
        assert!(cb.nodes.contains_key("Artifact:Audio[1]"));
        assert!(cb.nodes.contains_key("Artifact:Audio[2]"));
        assert!(!cb.nodes.contains_key("Artifact:Audio[3]"));
    }

    #[test]
    fn edges_align_script_to_every_audio_instance() {
        let tree = scenario_a_tree();
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Topic".to_string(), json!("space"));
        values.insert("Input:NumOfSegments".to_string(), json!(3));

        let cb = expand_blueprint(&tree, &graph, &values).unwrap();
        let script_to_audio: Vec<_> = cb.edges.iter().filter(|e| e.from == "Artifact:Script").collect();
        assert_eq!(script_to_audio.len(), 3);
    }

    #[test]
    fn missing_dimension_size_errors() {
        let tree = scenario_a_tree();
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:Topic".to_string(), json!("space"));
        let err = expand_blueprint(&tree, &graph, &values).unwrap_err();
        assert!(matches!(err, ExpandError::MissingDimensionSize(_)));
    }

    #[test]
    fn alias_chain_collapses_and_records_binding() {
        let mut root = doc("root");
        root.inputs.push(input("RawTopic"));
        root.inputs.push(input("Topic"));
        root.artefacts.push(ArtefactDecl {
            name: "Script".into(),
            ty: ValueType::String,
            required: true,
            count_input: None,
            count_input_offset: 0,
            schema: None,
        });
        root.edges.push(EdgeDecl { from: "RawTopic".into(), to: "Topic".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "Topic".into(), to: "Script".into(), conditions: None, group_by: None, order_by: None });
        let tree = BlueprintTree { root };
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:RawTopic".to_string(), json!("space"));

        let cb = expand_blueprint(&tree, &graph, &values).unwrap();
        assert!(cb.edges.iter().any(|e| e.from == "Input:RawTopic" && e.to == "Artifact:Script"));
        assert_eq!(
            cb.input_bindings.get("Artifact:Script").and_then(|m| m.get("Topic")),
            Some(&"Input:RawTopic".to_string())
        );
    }

    /// Two dimensions feeding one fan-in input: `segment` is namespace-scoped
    /// (declared via a loop on the `Segments` child document) and `variant`
    /// is local to `Image` (its own `countInput`). Every `Image[segment][variant]`
    /// instance should land in the dense, ordered fan-in group its segment
    /// index names, sorted by variant within the group.
    fn two_dimension_fan_in_tree() -> BlueprintTree {
        let mut root = doc("root");
        root.inputs.push(InputDecl {
            name: "NumOfSegments".into(),
            ty: ValueType::Number,
            required: true,
            default: None,
            fan_in: false,
        });
        root.inputs.push(InputDecl { name: "Images".into(), ty: ValueType::String, required: true, default: None, fan_in: true });

        let mut segments = doc("segments");
        segments.loops.push(reelforge_blueprint::LoopDecl {
            name: "segment".into(),
            count_input: "NumOfSegments".into(),
            offset: 0,
        });
        segments.artefacts.push(ArtefactDecl {
            name: "Image".into(),
            ty: ValueType::String,
            required: true,
            count_input: Some("NumOfImages".into()),
            count_input_offset: 0,
            schema: None,
        });
        root.children.insert("Segments".into(), segments);

        root.edges.push(EdgeDecl {
            from: "Segments[segment].Image[variant]".into(),
            to: "Images".into(),
            conditions: None,
            group_by: Some("segment".into()),
            order_by: Some("variant".into()),
        });
        BlueprintTree { root }
    }

    #[test]
    fn fan_in_groups_are_dense_and_ordered_across_two_dimensions() {
        let tree = two_dimension_fan_in_tree();
        let graph = build_blueprint_graph(&tree).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Input:NumOfSegments".to_string(), json!(2));
        values.insert("Input:NumOfImages".to_string(), json!(2));

        let cb = expand_blueprint(&tree, &graph, &values).unwrap();

        for seg in 0..2 {
            for variant in 0..2 {
                assert!(cb.nodes.contains_key(&format!("Artifact:Segments.Image[{seg}][{variant}]")));
            }
        }

        let descriptor = cb.fan_in.get("Input:Images").expect("Images should have a fan-in descriptor");
        assert_eq!(descriptor.group_by.as_deref(), Some("segment"));
        assert_eq!(descriptor.order_by.as_deref(), Some("variant"));
        assert_eq!(descriptor.members.len(), 4);

        for group in 0..2 {
            let mut in_group: Vec<_> = descriptor.members.iter().filter(|m| m.group == group).collect();
            in_group.sort_by_key(|m| m.order);
            assert_eq!(in_group.len(), 2);
            assert_eq!(in_group[0].order, Some(0));
            assert_eq!(in_group[1].order, Some(1));
            assert!(in_group[0].id.starts_with(&format!("Artifact:Segments.Image[{group}]")));
        }
    }
}
