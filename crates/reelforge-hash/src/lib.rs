//! Deterministic, cross-language-stable content hashing.
//!
//! Every hash in the engine is `sha256(canonical-json(value))`, hex-encoded.
//! Canonicalisation (sorted object keys, no insignificant whitespace, UTF-8)
//! is delegated to `serde_json_canonicalizer` so the same logical value
//! always hashes to the same digest regardless of field insertion order.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// `sha256(bytes)`, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256(stable-serialisation(value))`, hex-encoded.
///
/// Used directly for input-event hashes (`InputEvent.hash`) and for the
/// manifest hash (`sha256(stable-serialisation(manifest))`).
pub fn hash_value<T: Serialize>(value: &T) -> Result<String, HashError> {
    let json_value = serde_json::to_value(value).map_err(HashError::Serialize)?;
    let canonical = serde_json_canonicalizer::to_vec(&json_value)
        .map_err(|e| HashError::Canonicalize(e.to_string()))?;
    Ok(sha256_hex(&canonical))
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to serialize value for hashing: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to canonicalize value for hashing: {0}")]
    Canonicalize(String),
}

/// One entry contributing to `hashInputContents`: either the input's raw
/// value, or — for an upstream artefact input — that artefact's *manifest
/// hash* (never its raw blob bytes, so the function stays bounded by
/// manifest size rather than artefact payload size).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputContent {
    Value(serde_json::Value),
    UpstreamHash(String),
}

/// Stable hash of a job's resolved input contents: a canonical JSON object
/// mapping each input id to its contributed content, hashed as one unit.
///
/// Deterministic across languages and independent of the order `entries`
/// is passed in (the canonicalizer sorts object keys).
pub fn hash_input_contents<I, S>(entries: I) -> Result<String, HashError>
where
    I: IntoIterator<Item = (S, InputContent)>,
    S: Into<String>,
{
    let map: std::collections::BTreeMap<String, InputContent> =
        entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
    hash_value(&map)
}

/// The deterministic fields that make up an artefact's manifest hash,
/// independent of which concrete `ArtefactEvent`/`BlobRef` type a caller
/// crate defines (`reelforge-hash` stays a leaf dependency).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArtefactHashInput<'a> {
    pub artefact_id: &'a str,
    pub inputs_hash: &'a str,
    pub status: &'a str,
    pub blob_hash: Option<&'a str>,
    pub blob_size: Option<u64>,
    pub blob_mime_type: Option<&'a str>,
}

/// `deriveArtefactHash(event)` — hash of the event's blob reference plus
/// deterministic fields. Two events with identical artefact id, inputs
/// hash, status and blob reference always derive the same hash, so
/// `buildFromEvents` is referentially transparent.
pub fn derive_artefact_hash(input: &ArtefactHashInput<'_>) -> Result<String, HashError> {
    hash_value(input)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_hex_is_stable() {
        let h1 = sha256_hex(b"hello");
        let h2 = sha256_hex(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn hash_value_ignores_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn hash_value_is_sensitive_to_content() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn hash_input_contents_is_order_independent() {
        let a = vec![
            ("Input:Topic".to_string(), InputContent::Value(json!("space"))),
            (
                "Artifact:Script".to_string(),
                InputContent::UpstreamHash("abc".to_string()),
            ),
        ];
        let b = vec![
            (
                "Artifact:Script".to_string(),
                InputContent::UpstreamHash("abc".to_string()),
            ),
            ("Input:Topic".to_string(), InputContent::Value(json!("space"))),
        ];
        assert_eq!(
            hash_input_contents(a).unwrap(),
            hash_input_contents(b).unwrap()
        );
    }

    #[test]
    fn derive_artefact_hash_changes_with_blob_hash() {
        let base = ArtefactHashInput {
            artefact_id: "Artifact:Script",
            inputs_hash: "deadbeef",
            status: "succeeded",
            blob_hash: Some("h1"),
            blob_size: Some(10),
            blob_mime_type: Some("text/plain"),
        };
        let mut changed = base;
        changed.blob_hash = Some("h2");
        assert_ne!(
            derive_artefact_hash(&base).unwrap(),
            derive_artefact_hash(&changed).unwrap()
        );
    }
}
