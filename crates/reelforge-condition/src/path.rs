//! Path resolution against a flat `resolvedInputs` environment, with prefix
//! and index fallbacks (§4.1, §4.9 "Conditions").

use std::collections::BTreeMap;

use serde_json::Value;

fn strip_indices(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_brackets = false;
    for c in s.chars() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ if !in_brackets => out.push(c),
            _ => {}
        }
    }
    out
}

fn descend<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    if let Some(bracket_pos) = segment.find('[') {
        let field = &segment[..bracket_pos];
        let idx_str = segment[bracket_pos + 1..].trim_end_matches(']');
        let idx: usize = idx_str.parse().ok()?;
        let base = if field.is_empty() { value } else { value.get(field)? };
        base.get(idx)
    } else {
        value.get(segment)
    }
}

/// Resolve a dotted `when` path against `env`.
///
/// Tries, widest first, every contiguous window of dotted segments as the
/// environment key (plain, `Input:`-qualified, `Artifact:`-qualified, and
/// index-stripped variants of each), then descends into the matched JSON
/// value with whatever segments follow the window. Windows are tried
/// starting at position 0 first (the ordinary case, a path already rooted
/// at its base id) and only then at later starting positions, so a `when`
/// path carrying a leading namespace/alias segment the environment doesn't
/// key on (e.g. `Producer.Script.tone` against an env keyed by
/// `Artifact:Script`) still resolves via that ancestor's own base id.
pub fn resolve_path<'a>(path: &str, env: &'a BTreeMap<String, Value>) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    for start in 0..segments.len() {
        for end in (start + 1..=segments.len()).rev() {
            let prefix = segments[start..end].join(".");
            let stripped = strip_indices(&prefix);
            let candidates = [
                prefix.clone(),
                format!("Input:{prefix}"),
                format!("Artifact:{prefix}"),
                stripped.clone(),
                format!("Input:{stripped}"),
                format!("Artifact:{stripped}"),
            ];
            for candidate in candidates {
                if let Some(root) = env.get(&candidate) {
                    let mut current = root;
                    let mut ok = true;
                    for seg in &segments[end..] {
                        match descend(current, seg) {
                            Some(next) => current = next,
                            None => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if ok {
                        return Some(current);
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_plain_key() {
        let mut env = BTreeMap::new();
        env.insert("Artifact:Script".to_string(), json!({"tone": "upbeat"}));
        assert_eq!(resolve_path("Artifact:Script.tone", &env), Some(&json!("upbeat")));
    }

    #[test]
    fn resolves_via_ancestor_prefix_fallback() {
        let mut env = BTreeMap::new();
        env.insert("Artifact:Script".to_string(), json!({"tone": "upbeat"}));
        assert_eq!(resolve_path("Producer.Script.tone", &env), Some(&json!("upbeat")));
    }

    #[test]
    fn resolves_indexed_array_segment() {
        let mut env = BTreeMap::new();
        env.insert("Artifact:Timeline".to_string(), json!({"clips": [{"assetId": "a"}, {"assetId": "b"}]}));
        assert_eq!(resolve_path("Artifact:Timeline.clips[1].assetId", &env), Some(&json!("b")));
    }

    #[test]
    fn missing_path_resolves_to_none() {
        let env = BTreeMap::new();
        assert_eq!(resolve_path("Artifact:Nowhere.field", &env), None);
    }
}
