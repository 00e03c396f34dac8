//! The pure half of the pipeline (§2): turning a
//! [`reelforge_blueprint::BlueprintTree`] plus concrete input values into a
//! [`reelforge_producer::ProducerGraph`] touches no storage at all, so it is
//! kept as a free function the engine calls and a caller can call directly
//! (e.g. to validate a blueprint against a catalog before ever touching a
//! movie's event log).

use std::collections::BTreeMap;

use reelforge_blueprint::BlueprintTree;
use reelforge_expand::CanonicalBlueprint;
use reelforge_graph::BlueprintGraph;
use reelforge_producer::{ProducerCatalog, ProducerGraph};
use serde_json::Value;

use reelforge_error::EngineError;

/// `BlueprintTree -> BlueprintGraph -> CanonicalBlueprint -> ProducerGraph`
/// (§2), resolving every producer instance against `catalog` along the way.
pub fn expand_to_producer_graph(
    tree: &BlueprintTree,
    input_values: &BTreeMap<String, Value>,
    catalog: &ProducerCatalog,
) -> Result<(BlueprintGraph, CanonicalBlueprint, ProducerGraph), EngineError> {
    let graph = reelforge_graph::build_blueprint_graph(tree)?;
    let canonical = reelforge_expand::expand_blueprint(tree, &graph, input_values)?;
    let producer_graph = reelforge_producer::build_producer_graph(&graph, &canonical, catalog)?;
    Ok((graph, canonical, producer_graph))
}
