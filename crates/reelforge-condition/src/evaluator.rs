//! Evaluation of `EdgeConditionDefinition` clause trees (§4.9) against a
//! flat environment map.

use std::collections::BTreeMap;

use reelforge_blueprint::{ConditionClause, ConditionOp, ConditionValue, EdgeConditionDefinition};
use serde_json::Value;

use crate::path::resolve_path;

fn numeric_cmp(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    lhs.as_f64()?.partial_cmp(&rhs.as_f64()?)
}

fn eval_clause(clause: &ConditionClause, env: &BTreeMap<String, Value>) -> bool {
    let resolved = resolve_path(&clause.when, env);
    match &clause.is {
        ConditionValue::Literal(expected) => resolved == Some(expected),
        ConditionValue::Op { op, value: expected } => match op {
            ConditionOp::Eq => resolved == Some(expected),
            ConditionOp::Ne => resolved != Some(expected),
            ConditionOp::Exists => resolved.is_some(),
            ConditionOp::Gt => resolved
                .zip(Some(expected))
                .and_then(|(a, b)| numeric_cmp(a, b))
                .is_some_and(|o| o == std::cmp::Ordering::Greater),
            ConditionOp::Gte => resolved
                .zip(Some(expected))
                .and_then(|(a, b)| numeric_cmp(a, b))
                .is_some_and(|o| o != std::cmp::Ordering::Less),
            ConditionOp::Lt => resolved
                .zip(Some(expected))
                .and_then(|(a, b)| numeric_cmp(a, b))
                .is_some_and(|o| o == std::cmp::Ordering::Less),
            ConditionOp::Lte => resolved
                .zip(Some(expected))
                .and_then(|(a, b)| numeric_cmp(a, b))
                .is_some_and(|o| o != std::cmp::Ordering::Greater),
            ConditionOp::In => expected
                .as_array()
                .zip(resolved)
                .is_some_and(|(arr, v)| arr.contains(v)),
        },
    }
}

/// Evaluate a full `clause | {all} | {any}` condition tree.
pub fn evaluate_condition(condition: &EdgeConditionDefinition, env: &BTreeMap<String, Value>) -> bool {
    match condition {
        EdgeConditionDefinition::Clause(clause) => eval_clause(clause, env),
        EdgeConditionDefinition::All { all } => all.iter().all(|c| evaluate_condition(c, env)),
        EdgeConditionDefinition::Any { any } => any.iter().any(|c| evaluate_condition(c, env)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_with(key: &str, value: Value) -> BTreeMap<String, Value> {
        let mut env = BTreeMap::new();
        env.insert(key.to_string(), value);
        env
    }

    #[test]
    fn literal_clause_matches_equality() {
        let cond = EdgeConditionDefinition::Clause(ConditionClause {
            when: "Artifact:Script.tone".into(),
            is: ConditionValue::Literal(json!("upbeat")),
        });
        let env = env_with("Artifact:Script", json!({"tone": "upbeat"}));
        assert!(evaluate_condition(&cond, &env));
    }

    #[test]
    fn op_gt_compares_numerically() {
        let cond = EdgeConditionDefinition::Clause(ConditionClause {
            when: "Artifact:Script.wordCount".into(),
            is: ConditionValue::Op { op: ConditionOp::Gt, value: json!(100) },
        });
        let env = env_with("Artifact:Script", json!({"wordCount": 150}));
        assert!(evaluate_condition(&cond, &env));
    }

    #[test]
    fn exists_is_false_for_missing_path() {
        let cond = EdgeConditionDefinition::Clause(ConditionClause {
            when: "Artifact:Missing.field".into(),
            is: ConditionValue::Op { op: ConditionOp::Exists, value: Value::Null },
        });
        assert!(!evaluate_condition(&cond, &BTreeMap::new()));
    }

    #[test]
    fn all_requires_every_clause() {
        let env = env_with("Artifact:Script", json!({"tone": "upbeat", "wordCount": 10}));
        let cond = EdgeConditionDefinition::All {
            all: vec![
                EdgeConditionDefinition::Clause(ConditionClause {
                    when: "Artifact:Script.tone".into(),
                    is: ConditionValue::Literal(json!("upbeat")),
                }),
                EdgeConditionDefinition::Clause(ConditionClause {
                    when: "Artifact:Script.wordCount".into(),
                    is: ConditionValue::Op { op: ConditionOp::Gt, value: json!(100) },
                }),
            ],
        };
        assert!(!evaluate_condition(&cond, &env));
    }

    #[test]
    fn any_requires_one_clause() {
        let env = env_with("Artifact:Script", json!({"tone": "upbeat"}));
        let cond = EdgeConditionDefinition::Any {
            any: vec![
                EdgeConditionDefinition::Clause(ConditionClause {
                    when: "Artifact:Script.tone".into(),
                    is: ConditionValue::Literal(json!("sombre")),
                }),
                EdgeConditionDefinition::Clause(ConditionClause {
                    when: "Artifact:Script.tone".into(),
                    is: ConditionValue::Literal(json!("upbeat")),
                }),
            ],
        };
        assert!(evaluate_condition(&cond, &env));
    }
}
