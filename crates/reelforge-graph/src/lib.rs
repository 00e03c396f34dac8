//! The unexpanded blueprint graph builder (§4.2).
//!
//! Walks a [`reelforge_blueprint::BlueprintTree`] twice (in practice, in one
//! combined edge-driven pass — see [`builder::build_blueprint_graph`]) to
//! collect namespace and local dimension symbols, validate references, and
//! produce a [`model::BlueprintGraph`] ready for [`reelforge_expand`] to size
//! and instantiate.

mod builder;
mod input_resolver;
pub mod model;
mod reference;

pub use builder::build_blueprint_graph;
pub use input_resolver::{InputIdResolver, UnknownInputError};
pub use model::{
    ArtefactMeta, BlueprintGraph, DimensionScope, GraphEdge, GraphNode, LoopDef, NodeKind,
    ProducerMeta, QualifiedDimensionSymbol,
};
pub use reference::{ParsedReference, RefSegment, parse_reference};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphBuildError {
    #[error("invalid reference: '{0}'")]
    InvalidReference(String),

    #[error("invalid dimension selector: '{0}'")]
    InvalidDimensionSelector(String),

    #[error("unknown namespace: '{0}'")]
    UnknownNamespace(String),

    #[error(
        "dimension lineage conflict: symbol '{symbol}' has conflicting parents '{first_parent}' and '{second_parent}'"
    )]
    ConflictingDimensionLineage {
        symbol: String,
        first_parent: String,
        second_parent: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_blueprint::{
        ArtefactDecl, BlueprintDocument, BlueprintTree, DocumentMeta, EdgeDecl, InputDecl, LoopDecl,
        ValueType,
    };

    fn doc(name: &str) -> BlueprintDocument {
        BlueprintDocument {
            meta: DocumentMeta { id: name.into(), name: name.into() },
            ..Default::default()
        }
    }

    #[test]
    fn namespaced_dimension_propagates_to_child_nodes() {
        let mut scene = doc("scene");
        scene.loops.push(LoopDecl {
            name: "i".into(),
            count_input: "NumOfScenes".into(),
            offset: 0,
        });
        scene.artefacts.push(ArtefactDecl {
            name: "Script".into(),
            ty: ValueType::String,
            required: true,
            count_input: None,
            count_input_offset: 0,
            schema: None,
        });
        scene.inputs.push(InputDecl {
            name: "Topic".into(),
            ty: ValueType::String,
            required: true,
            default: None,
            fan_in: false,
        });
        scene.edges.push(EdgeDecl {
            from: "Topic".into(),
            to: "Script".into(),
            conditions: None,
            group_by: None,
            order_by: None,
        });

        let mut root = doc("root");
        root.children.insert("scene".into(), scene);
        root.edges.push(EdgeDecl {
            from: "scene[i].Topic".into(),
            to: "scene[i].Script".into(),
            conditions: None,
            group_by: None,
            order_by: None,
        });

        let tree = BlueprintTree { root };
        let graph = build_blueprint_graph(&tree).unwrap();
        let script = graph.nodes.get("Artifact:scene.Script").unwrap();
        assert_eq!(script.dimensions.len(), 1);
        assert_eq!(script.dimensions[0].raw_label, "i");
        assert_eq!(script.dimensions[0].scope, DimensionScope::Namespace);
    }
}
