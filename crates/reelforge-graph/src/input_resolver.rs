//! `InputIdResolver` (§4.1): maps a user-supplied key — a canonical id, a
//! qualified dotted name, a system input, or a decomposed-artefact path — to
//! the canonical id the rest of the engine addresses it by.

use std::collections::BTreeSet;

use reelforge_canon::{CanonicalId, is_system_input};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{BlueprintGraph, NodeKind};

/// All declared canonical input ids plus their qualified (dot-joined) names,
/// computed once from a [`BlueprintGraph`] and reused for every
/// `toCanonical` lookup.
#[derive(Debug, Clone, Default)]
pub struct InputIdResolver {
    declared_input_ids: BTreeSet<String>,
    declared_artifact_ids: BTreeSet<String>,
    /// Qualified name (namespace path joined by `.`, then leaf name) -> canonical input id.
    qualified_names: BTreeSet<(String, String)>,
}

static DECOMPOSED_INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("static regex"));

impl InputIdResolver {
    pub fn from_graph(graph: &BlueprintGraph) -> Self {
        let mut declared_input_ids = BTreeSet::new();
        let mut declared_artifact_ids = BTreeSet::new();
        let mut qualified_names = BTreeSet::new();

        for node in graph.nodes.values() {
            match node.kind {
                NodeKind::InputSource => {
                    declared_input_ids.insert(node.id.clone());
                    let qualified = if node.namespace_path.is_empty() {
                        node.name.clone()
                    } else {
                        format!("{}.{}", node.namespace_path.join("."), node.name)
                    };
                    qualified_names.insert((qualified, node.id.clone()));
                }
                NodeKind::Artifact => {
                    declared_artifact_ids.insert(node.id.clone());
                }
                NodeKind::Producer => {}
            }
        }

        Self { declared_input_ids, declared_artifact_ids, qualified_names }
    }

    /// `toCanonical(key)` (§4.1): resolve a user-supplied key to the
    /// canonical id the engine should key an `InputEvent`/override on.
    pub fn to_canonical(&self, key: &str) -> Result<String, UnknownInputError> {
        // (a) Canonical input id, validated for membership.
        if let Ok(parsed) = CanonicalId::parse(key) {
            if parsed.is_input() {
                let bare = key.strip_prefix("Input:").unwrap_or(key);
                return if self.declared_input_ids.contains(key) || is_system_input(bare) {
                    Ok(key.to_string())
                } else {
                    Err(UnknownInputError(key.to_string()))
                };
            }
            // (b) Canonical artefact id: pass through to allow artefact overrides.
            if parsed.is_artifact() {
                return Ok(key.to_string());
            }
        }

        // (d) System inputs, implicitly declared in the root namespace.
        if is_system_input(key) {
            return Ok(format!("Input:{key}"));
        }

        // (c) Qualified dotted name -> declared canonical input id.
        if let Some((_, id)) = self.qualified_names.iter().find(|(name, _)| name == key) {
            return Ok(id.clone());
        }

        // (e) Decomposed-artefact path heuristic: contains a `[digits]` index.
        if DECOMPOSED_INDEX_RE.is_match(key) {
            return Ok(format!("Artifact:{key}"));
        }

        Err(UnknownInputError(key.to_string()))
    }

    pub fn declared_input_ids(&self) -> impl Iterator<Item = &str> {
        self.declared_input_ids.iter().map(String::as_str)
    }

    pub fn is_declared_artifact(&self, id: &str) -> bool {
        self.declared_artifact_ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown input: '{0}'")]
pub struct UnknownInputError(pub String);
