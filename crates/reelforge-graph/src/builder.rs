//! The blueprint graph builder (§4.2): three passes over a [`BlueprintTree`]
//! producing an unexpanded [`BlueprintGraph`] with declared-but-unsized
//! dimension symbols.

use std::collections::BTreeMap;

use reelforge_blueprint::{BlueprintDocument, BlueprintTree, ValueType};
use reelforge_canon::{CanonicalId, IdKind, OwnedDimensionSelector};

use crate::model::{
    ArtefactMeta, BlueprintGraph, DimensionScope, GraphEdge, GraphNode, LoopDef, NodeKind,
    ProducerMeta, QualifiedDimensionSymbol,
};
use crate::reference::{ParsedReference, parse_reference};
use crate::GraphBuildError;

fn ns_key(path: &[String]) -> String {
    path.join(".")
}

fn node_id(kind: IdKind, path: &[String], name: &str) -> String {
    let refs: Vec<&str> = path.iter().map(String::as_str).collect();
    CanonicalId::format(kind, &refs, name)
}

/// Build the unexpanded blueprint graph from a parsed tree.
///
/// Pure and idempotent (§8 property 1): applying this twice to the same
/// tree yields structurally identical graphs, since it only reads the tree
/// and never mutates shared state across calls.
#[tracing::instrument(skip(tree))]
pub fn build_blueprint_graph(tree: &BlueprintTree) -> Result<BlueprintGraph, GraphBuildError> {
    let mut graph = BlueprintGraph::default();

    collect_base_nodes(tree, &mut graph)?;
    collect_loops(tree, &mut graph);

    // Namespace-dimension ordinal counters, keyed by (namespace path, raw label).
    let mut namespace_dim_ordinals: BTreeMap<String, usize> = BTreeMap::new();
    // Per-node local-dimension ordinal counters, keyed by node id.
    let mut local_dim_ordinals: BTreeMap<String, usize> = BTreeMap::new();
    // Conflict tracking: namespace path -> raw_label -> declared (to check mismatched dimension
    // counts/labels across repeated references to the same namespace).
    let mut namespace_conflicts: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (doc_path, doc) in tree.walk() {
        for edge_decl in &doc.edges {
            let from_ref = parse_reference(&edge_decl.from)?;
            let to_ref = parse_reference(&edge_decl.to)?;

            let (from_id, from_selectors) = resolve_reference(
                tree,
                &doc_path,
                &from_ref,
                &mut graph,
                &mut namespace_dim_ordinals,
                &mut local_dim_ordinals,
                &mut namespace_conflicts,
            )?;
            let (to_id, to_selectors) = resolve_reference(
                tree,
                &doc_path,
                &to_ref,
                &mut graph,
                &mut namespace_dim_ordinals,
                &mut local_dim_ordinals,
                &mut namespace_conflicts,
            )?;

            link_dimension_lineage(&mut graph, &from_selectors, &to_selectors)?;

            graph.edges.push(GraphEdge {
                from: from_id,
                to: to_id,
                from_selectors,
                to_selectors,
                conditions: edge_decl.conditions.clone(),
                group_by: edge_decl.group_by.clone(),
                order_by: edge_decl.order_by.clone(),
            });
        }
    }

    tracing::debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "built blueprint graph");
    Ok(graph)
}

fn collect_loops(tree: &BlueprintTree, graph: &mut BlueprintGraph) {
    for (path, doc) in tree.walk() {
        if doc.loops.is_empty() {
            continue;
        }
        let defs = doc
            .loops
            .iter()
            .map(|l| LoopDef {
                raw_label: l.name.clone(),
                count_input: l.count_input.clone(),
                offset: l.offset,
            })
            .collect();
        graph.loops.insert(ns_key(&path), defs);
    }
}

fn collect_base_nodes(tree: &BlueprintTree, graph: &mut BlueprintGraph) -> Result<(), GraphBuildError> {
    for (path, doc) in tree.walk() {
        for input in &doc.inputs {
            let id = node_id(IdKind::Input, &path, &input.name);
            graph.nodes.insert(
                id.clone(),
                GraphNode {
                    id,
                    kind: NodeKind::InputSource,
                    namespace_path: path.clone(),
                    name: input.name.clone(),
                    dimensions: Vec::new(),
                    artefact: None,
                    producer: None,
                    constant_index: None,
                },
            );
        }

        for artefact in &doc.artefacts {
            if let Some(decomp) = &artefact.schema {
                for binding in &decomp.arrays {
                    let leaf_label = binding
                        .path
                        .rsplit('.')
                        .next()
                        .unwrap_or(&binding.path)
                        .to_string();
                    let synthetic_name = format!("{}[{leaf_label}]", artefact.name);
                    let id = node_id(IdKind::Artifact, &path, &synthetic_name);
                    graph.nodes.insert(
                        id.clone(),
                        GraphNode {
                            id,
                            kind: NodeKind::Artifact,
                            namespace_path: path.clone(),
                            name: synthetic_name,
                            dimensions: Vec::new(),
                            artefact: Some(ArtefactMeta {
                                required: artefact.required,
                                count_input: Some(binding.count_input.clone()),
                                count_input_offset: artefact.count_input_offset,
                                decomposed_from: Some(leaf_label),
                            }),
                            producer: None,
                            constant_index: None,
                        },
                    );
                }
                continue;
            }

            let id = node_id(IdKind::Artifact, &path, &artefact.name);
            graph.nodes.insert(
                id.clone(),
                GraphNode {
                    id,
                    kind: NodeKind::Artifact,
                    namespace_path: path.clone(),
                    name: artefact.name.clone(),
                    dimensions: Vec::new(),
                    artefact: Some(ArtefactMeta {
                        required: artefact.required,
                        count_input: artefact.count_input.clone(),
                        count_input_offset: artefact.count_input_offset,
                        decomposed_from: None,
                    }),
                    producer: None,
                    constant_index: None,
                },
            );
        }

        for producer in &doc.producers {
            let id = node_id(IdKind::Producer, &path, &producer.name);
            graph.nodes.insert(
                id.clone(),
                GraphNode {
                    id,
                    kind: NodeKind::Producer,
                    namespace_path: path.clone(),
                    name: producer.name.clone(),
                    dimensions: Vec::new(),
                    artefact: None,
                    producer: Some(ProducerMeta {
                        provider: producer.provider.clone(),
                        model: producer.model.clone(),
                        models: producer
                            .models
                            .iter()
                            .map(|m| (m.provider.clone(), m.model.clone()))
                            .collect(),
                        sdk_mapping: producer.sdk_mapping.clone(),
                    }),
                    constant_index: None,
                },
            );
        }
    }
    Ok(())
}

/// Resolve a parsed edge-reference relative to the document that declared
/// the edge, descending through namespace segments (each validated against
/// the tree) and registering any dimension selectors encountered along the
/// way. Returns the resolved node id and the selector list aligned with that
/// node's eventual `dimensions` vector (namespace-scope selectors first, in
/// declaration order, then any local-scope selector on the leaf segment).
#[allow(clippy::too_many_arguments)]
fn resolve_reference(
    tree: &BlueprintTree,
    doc_path: &[String],
    reference: &ParsedReference,
    graph: &mut BlueprintGraph,
    namespace_dim_ordinals: &mut BTreeMap<String, usize>,
    local_dim_ordinals: &mut BTreeMap<String, usize>,
    namespace_conflicts: &mut BTreeMap<String, Vec<String>>,
) -> Result<(String, Vec<Option<OwnedDimensionSelector>>), GraphBuildError> {
    let mut current_path = doc_path.to_vec();
    let mut selectors = Vec::new();

    for seg in reference.namespace_segments() {
        current_path.push(seg.name.clone());
        if tree.document_at(&current_path).is_none() {
            return Err(GraphBuildError::UnknownNamespace(ns_key(&current_path)));
        }
        let scope_key = ns_key(&current_path);
        for selector in &seg.selectors {
            if let OwnedDimensionSelector::Loop { symbol, offset: 0 } = selector {
                let declared = namespace_conflicts.entry(scope_key.clone()).or_default();
                if !declared.contains(symbol) {
                    declared.push(symbol.clone());
                    if declared.len() > 1 {
                        // A namespace may have more than one independent dimension
                        // (e.g. scene and variant); distinct raw labels are fine as
                        // long as each is used consistently, which the ordinal map
                        // below enforces by key.
                    }
                }
            }
            let key = format!("{scope_key}::{}", selector_label(selector));
            let ordinal = *namespace_dim_ordinals
                .entry(key)
                .or_insert_with(|| namespace_dim_ordinals.len());
            register_dimension_for_namespace(
                graph,
                &scope_key,
                QualifiedDimensionSymbol {
                    node_id: scope_key.clone(),
                    scope: DimensionScope::Namespace,
                    scope_key: scope_key.clone(),
                    ordinal,
                    raw_label: selector_label(selector),
                },
            );
            selectors.push(Some(selector.clone()));
        }
        if seg.selectors.is_empty() {
            // A namespace segment referenced with no selector contributes no
            // dimension-alignment constraint at this position.
        }
    }

    let leaf = reference.leaf();
    let kind = classify_leaf(tree, &current_path, &leaf.name)?;
    let final_path = &current_path;

    // Constant-indexed local input reference (§4.2 pass three): the base
    // input is not declared in the current namespace but is found in an
    // ancestor, and the leaf carries a single constant selector.
    let (id, is_constant_ref) = if kind == IdKind::Input
        && tree
            .document_at(&current_path)
            .is_some_and(|d| !d.inputs.iter().any(|i| i.name == leaf.name))
        && leaf.selectors.len() == 1
        && matches!(leaf.selectors[0], OwnedDimensionSelector::Const { .. })
    {
        let OwnedDimensionSelector::Const { value } = leaf.selectors[0] else {
            unreachable!()
        };
        let synthetic_name = format!("{}[{value}]", leaf.name);
        let id = node_id(IdKind::Input, final_path, &synthetic_name);
        graph.nodes.entry(id.clone()).or_insert_with(|| GraphNode {
            id: id.clone(),
            kind: NodeKind::InputSource,
            namespace_path: current_path.clone(),
            name: synthetic_name,
            dimensions: Vec::new(),
            artefact: None,
            producer: None,
            constant_index: Some(value),
        });
        (id, true)
    } else {
        (node_id(kind, final_path, &leaf.name), false)
    };

    if !is_constant_ref {
        for selector in &leaf.selectors {
            if let OwnedDimensionSelector::Loop { .. } = selector {
                let ordinal = *local_dim_ordinals
                    .entry(id.clone())
                    .and_modify(|n| *n += 1)
                    .or_insert(0);
                let symbol = QualifiedDimensionSymbol {
                    node_id: id.clone(),
                    scope: DimensionScope::Local,
                    scope_key: id.clone(),
                    ordinal,
                    raw_label: selector_label(selector),
                };
                if let Some(node) = graph.nodes.get_mut(&id) {
                    if !node.dimensions.iter().any(|d| d.raw_label == symbol.raw_label) {
                        node.dimensions.push(symbol);
                    }
                }
            }
            selectors.push(Some(selector.clone()));
        }
    }

    Ok((id, selectors))
}

fn selector_label(selector: &OwnedDimensionSelector) -> String {
    match selector {
        OwnedDimensionSelector::Loop { symbol, .. } => symbol.clone(),
        OwnedDimensionSelector::Const { value } => value.to_string(),
    }
}

fn register_dimension_for_namespace(
    graph: &mut BlueprintGraph,
    namespace_key: &str,
    symbol: QualifiedDimensionSymbol,
) {
    for node in graph.nodes.values_mut() {
        let node_ns_key = ns_key(&node.namespace_path);
        if node_ns_key == namespace_key
            || node_ns_key.starts_with(&format!("{namespace_key}."))
        {
            if !node.dimensions.iter().any(|d| d.scope_key == symbol.scope_key && d.raw_label == symbol.raw_label) {
                node.dimensions.push(symbol.clone());
            }
        }
    }
}

fn classify_leaf(
    tree: &BlueprintTree,
    path: &[String],
    name: &str,
) -> Result<IdKind, GraphBuildError> {
    let doc = find_declaring_document(tree, path, name)
        .ok_or_else(|| GraphBuildError::UnknownNamespace(ns_key(path)))?;
    if doc.inputs.iter().any(|i| i.name == name) {
        return Ok(IdKind::Input);
    }
    if doc.artefacts.iter().any(|a| a.name == name) {
        return Ok(IdKind::Artifact);
    }
    if doc.producers.iter().any(|p| p.name == name) {
        return Ok(IdKind::Producer);
    }
    if reelforge_canon::is_system_input(name) {
        return Ok(IdKind::Input);
    }
    Err(GraphBuildError::InvalidReference(format!(
        "{}.{name}",
        ns_key(path)
    )))
}

/// Find the document that actually declares `name`: first the document at
/// `path`, then each ancestor up to the root (constant-indexed references
/// and system inputs are declared higher up the tree than where they are
/// used, §4.1, §4.2 pass three).
fn find_declaring_document<'a>(
    tree: &'a BlueprintTree,
    path: &[String],
    name: &str,
) -> Option<&'a BlueprintDocument> {
    let mut candidate = path.to_vec();
    loop {
        if let Some(doc) = tree.document_at(&candidate) {
            if doc.inputs.iter().any(|i| i.name == name)
                || doc.artefacts.iter().any(|a| a.name == name)
                || doc.producers.iter().any(|p| p.name == name)
            {
                return Some(doc);
            }
        }
        if candidate.is_empty() {
            return tree.document_at(&[]);
        }
        candidate.pop();
    }
}

fn link_dimension_lineage(
    graph: &mut BlueprintGraph,
    from_selectors: &[Option<OwnedDimensionSelector>],
    to_selectors: &[Option<OwnedDimensionSelector>],
) -> Result<(), GraphBuildError> {
    for (from_sel, to_sel) in from_selectors.iter().zip(to_selectors.iter()) {
        if let (
            Some(OwnedDimensionSelector::Loop { symbol: from_sym, offset: 0 }),
            Some(OwnedDimensionSelector::Loop { symbol: to_sym, offset: 0 }),
        ) = (from_sel, to_sel)
        {
            let entry = graph.dimension_lineage.entry(to_sym.clone()).or_insert(None);
            match entry {
                None => *entry = Some(from_sym.clone()),
                Some(existing) if existing == from_sym => {}
                Some(existing) => {
                    return Err(GraphBuildError::ConflictingDimensionLineage {
                        symbol: to_sym.clone(),
                        first_parent: existing.clone(),
                        second_parent: from_sym.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_blueprint::{ArtefactDecl, BlueprintDocument, DocumentMeta, EdgeDecl, InputDecl};

    fn doc(name: &str) -> BlueprintDocument {
        BlueprintDocument {
            meta: DocumentMeta { id: name.into(), name: name.into() },
            ..Default::default()
        }
    }

    fn input(name: &str) -> InputDecl {
        InputDecl {
            name: name.to_string(),
            ty: ValueType::String,
            required: true,
            default: None,
            fan_in: false,
        }
    }

    fn artefact(name: &str) -> ArtefactDecl {
        ArtefactDecl {
            name: name.to_string(),
            ty: ValueType::String,
            required: true,
            count_input: None,
            count_input_offset: 0,
            schema: None,
        }
    }

    #[test]
    fn simple_linear_blueprint_builds_nodes_and_edges() {
        let mut root = doc("root");
        root.inputs.push(input("Topic"));
        root.artefacts.push(artefact("Script"));
        root.edges.push(EdgeDecl {
            from: "Topic".into(),
            to: "Script".into(),
            conditions: None,
            group_by: None,
            order_by: None,
        });
        let tree = BlueprintTree { root };
        let graph = build_blueprint_graph(&tree).unwrap();
        assert!(graph.nodes.contains_key("Input:Topic"));
        assert!(graph.nodes.contains_key("Artifact:Script"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, "Input:Topic");
        assert_eq!(graph.edges[0].to, "Artifact:Script");
    }

    #[test]
    fn builder_is_idempotent() {
        let mut root = doc("root");
        root.inputs.push(input("Topic"));
        root.artefacts.push(artefact("Script"));
        root.edges.push(EdgeDecl {
            from: "Topic".into(),
            to: "Script".into(),
            conditions: None,
            group_by: None,
            order_by: None,
        });
        let tree = BlueprintTree { root };
        let a = build_blueprint_graph(&tree).unwrap();
        let b = build_blueprint_graph(&tree).unwrap();
        assert_eq!(a.nodes.keys().collect::<Vec<_>>(), b.nodes.keys().collect::<Vec<_>>());
        assert_eq!(a.edges.len(), b.edges.len());
    }

    #[test]
    fn unknown_namespace_reference_errors() {
        let mut root = doc("root");
        root.edges.push(EdgeDecl {
            from: "nope[i].Thing".into(),
            to: "Other".into(),
            conditions: None,
            group_by: None,
            order_by: None,
        });
        let tree = BlueprintTree { root };
        assert!(build_blueprint_graph(&tree).is_err());
    }
}
