//! The blueprint document tree: the parsed-but-unexpanded declaration of a
//! pipeline, supplied to the engine at its boundary. Concrete YAML/TOML
//! loaders are out of scope here; callers hand in an already-parsed
//! [`BlueprintTree`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rooted tree of [`BlueprintDocument`]s. The root has no namespace
/// prefix; children are keyed by their sub-blueprint namespace name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintTree {
    pub root: BlueprintDocument,
}

impl BlueprintTree {
    /// Depth-first walk of every document in the tree, yielding each
    /// document alongside its namespace path (empty for the root).
    pub fn walk(&self) -> Vec<(Vec<String>, &BlueprintDocument)> {
        let mut out = Vec::new();
        walk_into(&[], &self.root, &mut out);
        out
    }

    /// Look up a document by its dot-joined namespace path (`""` for root).
    pub fn document_at(&self, path: &[String]) -> Option<&BlueprintDocument> {
        let mut doc = &self.root;
        for segment in path {
            doc = doc.children.get(segment)?;
        }
        Some(doc)
    }
}

fn walk_into<'a>(
    prefix: &[String],
    doc: &'a BlueprintDocument,
    out: &mut Vec<(Vec<String>, &'a BlueprintDocument)>,
) {
    out.push((prefix.to_vec(), doc));
    for (name, child) in &doc.children {
        let mut child_prefix = prefix.to_vec();
        child_prefix.push(name.clone());
        walk_into(&child_prefix, child, out);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintDocument {
    pub meta: DocumentMeta,
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    #[serde(default)]
    pub artefacts: Vec<ArtefactDecl>,
    #[serde(default)]
    pub producers: Vec<ProducerDecl>,
    #[serde(default)]
    pub loops: Vec<LoopDecl>,
    #[serde(default)]
    pub edges: Vec<EdgeDecl>,
    #[serde(default)]
    pub collectors: Vec<CollectorDecl>,
    /// Sub-blueprints, keyed by namespace name.
    #[serde(default)]
    pub children: BTreeMap<String, BlueprintDocument>,
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
        }
    }
}

/// The declared type of an input or artefact value. The engine does not
/// validate values against this beyond "is it present" / "is it a finite
/// positive integer" (for dimension-sizing inputs) — richer schema
/// validation is a provider/UI concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Marks this input as a fan-in target: it collects multiple upstream
    /// artefacts into a grouped/ordered value (§4.3 step 4).
    #[serde(default, rename = "fanIn")]
    pub fan_in: bool,
}

/// A single leaf-field binding inside a JSON-schema artefact's `arrays`
/// list: `path` is the dotted JSON path to the array field; `count_input`
/// names the input whose value sizes that array dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayCountBinding {
    pub path: String,
    #[serde(rename = "countInput")]
    pub count_input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaDecomposition {
    pub schema: Value,
    #[serde(default)]
    pub arrays: Vec<ArrayCountBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "countInput")]
    pub count_input: Option<String>,
    #[serde(default, rename = "countInputOffset")]
    pub count_input_offset: u64,
    #[serde(default)]
    pub schema: Option<JsonSchemaDecomposition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerModelVariant {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerDecl {
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub models: Vec<ProducerModelVariant>,
    #[serde(default, rename = "sdkMapping")]
    pub sdk_mapping: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDecl {
    pub name: String,
    #[serde(rename = "countInput")]
    pub count_input: String,
    #[serde(default)]
    pub offset: u64,
}

/// A single atomic condition clause: `{when: "dotted.path", is: value-or-op}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    pub when: String,
    pub is: ConditionValue,
}

/// Either a bare literal (`is: "foo"` means equality) or an explicit
/// comparison operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Op { op: ConditionOp, value: Value },
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
}

/// A tree of edge conditions: a clause, or an `all`/`any` combinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeConditionDefinition {
    All { all: Vec<EdgeConditionDefinition> },
    Any { any: Vec<EdgeConditionDefinition> },
    Clause(ConditionClause),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDecl {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub conditions: Option<EdgeConditionDefinition>,
    #[serde(default, rename = "groupBy")]
    pub group_by: Option<String>,
    #[serde(default, rename = "orderBy")]
    pub order_by: Option<String>,
}

/// Explicit fan-in grouping, used when a fan-in input has more than one
/// upstream source and an implicit single-source collapse would be
/// ambiguous (§4.3 step 4, §4.9 "Fan-in without a collector").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorDecl {
    pub from: String,
    pub into: String,
    #[serde(rename = "groupBy")]
    pub group_by: String,
    #[serde(default, rename = "orderBy")]
    pub order_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> BlueprintDocument {
        BlueprintDocument {
            meta: DocumentMeta {
                id: name.to_string(),
                name: name.to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn walk_visits_root_then_children_with_paths() {
        let mut root = leaf("root");
        root.children.insert("scene".to_string(), leaf("scene"));
        let tree = BlueprintTree { root };
        let visited: Vec<Vec<String>> = tree.walk().into_iter().map(|(p, _)| p).collect();
        assert_eq!(visited, vec![vec![], vec!["scene".to_string()]]);
    }

    #[test]
    fn document_at_resolves_nested_path() {
        let mut root = leaf("root");
        let mut scene = leaf("scene");
        scene.children.insert("shot".to_string(), leaf("shot"));
        root.children.insert("scene".to_string(), scene);
        let tree = BlueprintTree { root };
        let doc = tree
            .document_at(&["scene".to_string(), "shot".to_string()])
            .unwrap();
        assert_eq!(doc.meta.id, "shot");
    }

    #[test]
    fn condition_value_accepts_literal_and_op() {
        let lit: ConditionValue = serde_json::from_value(serde_json::json!("on")).unwrap();
        assert!(matches!(lit, ConditionValue::Literal(_)));
        let op: ConditionValue =
            serde_json::from_value(serde_json::json!({"op": "gt", "value": 3})).unwrap();
        assert!(matches!(op, ConditionValue::Op { op: ConditionOp::Gt, .. }));
    }
}
