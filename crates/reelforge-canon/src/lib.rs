//! Canonical id grammar and dimension selector parsing.
//!
//! Every node, edge endpoint, and event key in the pipeline engine is
//! addressed by a canonical id string of the form:
//!
//! ```text
//! id        := kind ":" dotted-path
//! kind      := "Input" | "Artifact" | "Producer"
//! dotted-path := segment ("." segment)*
//! segment   := name ("[" non-negative-int "]")*
//! ```
//!
//! Only `Artifact:` ids carry numeric indices once a blueprint has been
//! expanded (see `reelforge-expand`); `Input:` and `Producer:` ids never do.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three mutually exclusive kinds of canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdKind {
    Input,
    Artifact,
    Producer,
}

impl IdKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Artifact => "Artifact",
            Self::Producer => "Producer",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while parsing or validating canonical ids and selectors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonError {
    #[error("invalid reference: '{0}' has no 'Kind:' prefix")]
    MissingKindPrefix(String),

    #[error("invalid reference: unknown id kind '{0}'")]
    UnknownKind(String),

    #[error("invalid reference: empty dotted path in '{0}'")]
    EmptyPath(String),

    #[error("invalid reference: malformed segment '{0}' in id '{1}'")]
    MalformedSegment(String, String),

    #[error("invalid reference: {kind} ids may not carry numeric indices, found in '{id}'")]
    UnexpectedIndices { kind: &'static str, id: String },

    #[error("invalid dimension selector: '{0}'")]
    InvalidDimensionSelector(String),

    #[error(
        "invalid dimension selector: numeric literal '{0}' used where a loop symbol was expected"
    )]
    NumericSelectorInDeclaration(String),
}

/// One dotted-path segment together with any trailing `[n]` index groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    pub indices: Vec<u64>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for idx in &self.indices {
            write!(f, "[{idx}]")?;
        }
        Ok(())
    }
}

/// A fully-qualified canonical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalId {
    pub kind: IdKind,
    pub segments: Vec<PathSegment>,
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.kind)?;
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)((?:\[\d+\])*)$").expect("static regex is valid")
});
static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("static regex is valid"));

impl CanonicalId {
    /// Parse a canonical id string, validating grammar and kind-specific
    /// index constraints.
    pub fn parse(id: &str) -> Result<Self, CanonError> {
        let (kind_str, rest) = id
            .split_once(':')
            .ok_or_else(|| CanonError::MissingKindPrefix(id.to_string()))?;
        let kind = match kind_str {
            "Input" => IdKind::Input,
            "Artifact" => IdKind::Artifact,
            "Producer" => IdKind::Producer,
            other => return Err(CanonError::UnknownKind(other.to_string())),
        };
        if rest.is_empty() {
            return Err(CanonError::EmptyPath(id.to_string()));
        }
        let mut segments = Vec::new();
        for raw in rest.split('.') {
            let caps = SEGMENT_RE
                .captures(raw)
                .ok_or_else(|| CanonError::MalformedSegment(raw.to_string(), id.to_string()))?;
            let name = caps[1].to_string();
            let indices = INDEX_RE
                .captures_iter(&caps[2])
                .map(|c| c[1].parse::<u64>().expect("regex guarantees digits"))
                .collect::<Vec<_>>();
            segments.push(PathSegment { name, indices });
        }
        Ok(Self { kind, segments })
    }

    /// Validates the "only `Artifact:` ids carry numeric indices" invariant
    /// that holds for every id appearing in an *expanded* `CanonicalBlueprint`
    /// (§3). This is deliberately not enforced by [`Self::parse`] itself: the
    /// unexpanded blueprint graph builder legitimately produces `Input:`
    /// node names with a literal, author-chosen bracket (e.g.
    /// `Input:ReferenceImages[0]`, §4.2 pass three) that is not a dimension
    /// and must survive parsing before expansion-time validation runs.
    pub fn validate_expanded_kind_indices(&self) -> Result<(), CanonError> {
        if self.kind != IdKind::Artifact && self.indices().next().is_some() {
            return Err(CanonError::UnexpectedIndices {
                kind: self.kind.as_str(),
                id: self.to_string(),
            });
        }
        Ok(())
    }

    /// Build a canonical id from a namespace path and leaf name. The leaf
    /// name may itself contain bracketed indices (e.g. `"Image[0][1]"`).
    pub fn format(kind: IdKind, path: &[&str], name: &str) -> String {
        if path.is_empty() {
            format!("{kind}:{name}")
        } else {
            format!("{kind}:{}.{name}", path.join("."))
        }
    }

    /// All numeric indices across all segments, in left-to-right
    /// declaration order.
    pub fn indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.segments.iter().flat_map(|s| s.indices.iter().copied())
    }

    /// This id with every `[n]` index group stripped, as a string. Used to
    /// match a dirty *instance* id back to its declaring base id.
    pub fn base(&self) -> String {
        let mut out = format!("{}:", self.kind);
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&seg.name);
        }
        out
    }

    pub fn is_input(&self) -> bool {
        self.kind == IdKind::Input
    }
    pub fn is_artifact(&self) -> bool {
        self.kind == IdKind::Artifact
    }
    pub fn is_producer(&self) -> bool {
        self.kind == IdKind::Producer
    }
}

/// `strip_indices("Artifact:Image[0][1]") == "Artifact:Image"`
pub fn strip_indices(id: &str) -> String {
    INDEX_RE.replace_all(id, "").to_string()
}

pub fn is_canonical_input_id(id: &str) -> bool {
    CanonicalId::parse(id).is_ok_and(|c| c.kind == IdKind::Input)
}
pub fn is_canonical_artifact_id(id: &str) -> bool {
    CanonicalId::parse(id).is_ok_and(|c| c.kind == IdKind::Artifact)
}
pub fn is_canonical_producer_id(id: &str) -> bool {
    CanonicalId::parse(id).is_ok_and(|c| c.kind == IdKind::Producer)
}

/// `formatProducerAlias` — the identifier used for graph references to a
/// producer. A namespaced producer's alias is its namespace path joined by
/// `.`; a root producer's alias is its own name. The alias may shadow the
/// producer's internal `name` (import-alias precedence).
pub fn format_producer_alias(namespace_path: &[&str], producer_name: &str) -> String {
    if namespace_path.is_empty() {
        producer_name.to_string()
    } else {
        namespace_path.join(".")
    }
}

/// A dimension coordinate on an edge endpoint: a loop symbol with an
/// integer offset (`"i"` => offset 0, `"i+1"`, `"i-2"`), or a literal
/// numeric constant (`"0"`, `"3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnedDimensionSelector {
    Loop { symbol: String, offset: i64 },
    Const { value: u64 },
}

static SELECTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)([+-]\d+)?$").expect("static regex is valid"));
static CONST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("static regex is valid"));

/// Parse a dimension selector token found inside `[...]` in an edge
/// reference, e.g. `"i"`, `"i+1"`, `"i-2"`, or a bare integer constant.
pub fn parse_dimension_selector(token: &str) -> Result<OwnedDimensionSelector, CanonError> {
    if CONST_RE.is_match(token) {
        let value: u64 = token
            .parse()
            .map_err(|_| CanonError::InvalidDimensionSelector(token.to_string()))?;
        return Ok(OwnedDimensionSelector::Const { value });
    }
    let caps = SELECTOR_RE
        .captures(token)
        .ok_or_else(|| CanonError::InvalidDimensionSelector(token.to_string()))?;
    let symbol = caps[1].to_string();
    let offset = match caps.get(2) {
        Some(m) => m.as_str().parse::<i64>().map_err(|_| {
            CanonError::InvalidDimensionSelector(token.to_string())
        })?,
        None => 0,
    };
    Ok(OwnedDimensionSelector::Loop { symbol, offset })
}

/// A numeric selector used where a declaration expects a loop symbol (e.g.
/// `[0]` in a `loops` block) is a static error, not silently accepted as a
/// constant selector.
pub fn parse_loop_symbol_declaration(token: &str) -> Result<String, CanonError> {
    if CONST_RE.is_match(token) {
        return Err(CanonError::NumericSelectorInDeclaration(token.to_string()));
    }
    match parse_dimension_selector(token)? {
        OwnedDimensionSelector::Loop { symbol, offset: 0 } => Ok(symbol),
        _ => Err(CanonError::InvalidDimensionSelector(token.to_string())),
    }
}

/// System inputs implicitly declared in the root namespace when referenced
/// by an edge without an explicit declaration.
pub const SYSTEM_INPUTS: &[&str] = &[
    "Duration",
    "NumOfSegments",
    "SegmentDuration",
    "MovieId",
    "StorageRoot",
    "StorageBasePath",
];

pub fn is_system_input(name: &str) -> bool {
    SYSTEM_INPUTS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_input_id() {
        let id = CanonicalId::parse("Input:Topic").unwrap();
        assert_eq!(id.kind, IdKind::Input);
        assert_eq!(id.to_string(), "Input:Topic");
    }

    #[test]
    fn parses_indexed_artifact_id() {
        let id = CanonicalId::parse("Artifact:Image[0][1]").unwrap();
        assert_eq!(id.kind, IdKind::Artifact);
        assert_eq!(id.indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(id.base(), "Artifact:Image");
    }

    #[test]
    fn parses_dotted_decomposed_artifact_id() {
        let id = CanonicalId::parse("Artifact:Segments[2].Script").unwrap();
        assert_eq!(id.indices().collect::<Vec<_>>(), vec![2]);
        assert_eq!(id.to_string(), "Artifact:Segments[2].Script");
    }

    #[test]
    fn expanded_validation_rejects_indices_on_input_and_producer_ids() {
        let input = CanonicalId::parse("Input:Topic[0]").unwrap();
        assert!(matches!(
            input.validate_expanded_kind_indices(),
            Err(CanonError::UnexpectedIndices { .. })
        ));
        let producer = CanonicalId::parse("Producer:Audio[0]").unwrap();
        assert!(matches!(
            producer.validate_expanded_kind_indices(),
            Err(CanonError::UnexpectedIndices { .. })
        ));
        let artifact = CanonicalId::parse("Artifact:Audio[0]").unwrap();
        assert!(artifact.validate_expanded_kind_indices().is_ok());
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(matches!(
            CanonicalId::parse("Bogus:Thing"),
            Err(CanonError::UnknownKind(_))
        ));
    }

    #[test]
    fn strip_indices_removes_all_brackets() {
        assert_eq!(strip_indices("Artifact:Image[0][1]"), "Artifact:Image");
        assert_eq!(
            strip_indices("Artifact:Segments[2].Script"),
            "Artifact:Segments.Script"
        );
    }

    #[test]
    fn formats_producer_alias() {
        assert_eq!(format_producer_alias(&[], "Script"), "Script");
        assert_eq!(
            format_producer_alias(&["scene", "0"], "Script"),
            "scene.0"
        );
    }

    #[test]
    fn parses_dimension_selectors() {
        assert_eq!(
            parse_dimension_selector("i").unwrap(),
            OwnedDimensionSelector::Loop {
                symbol: "i".into(),
                offset: 0
            }
        );
        assert_eq!(
            parse_dimension_selector("i+1").unwrap(),
            OwnedDimensionSelector::Loop {
                symbol: "i".into(),
                offset: 1
            }
        );
        assert_eq!(
            parse_dimension_selector("i-2").unwrap(),
            OwnedDimensionSelector::Loop {
                symbol: "i".into(),
                offset: -2
            }
        );
        assert_eq!(
            parse_dimension_selector("3").unwrap(),
            OwnedDimensionSelector::Const { value: 3 }
        );
    }

    #[test]
    fn rejects_numeric_selector_in_declaration_context() {
        assert!(matches!(
            parse_loop_symbol_declaration("0"),
            Err(CanonError::NumericSelectorInDeclaration(_))
        ));
        assert!(parse_loop_symbol_declaration("segment").is_ok());
    }

    #[test]
    fn system_inputs_are_recognised() {
        assert!(is_system_input("MovieId"));
        assert!(!is_system_input("Topic"));
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_format_parse(
            a in "[A-Za-z][A-Za-z0-9]{0,8}",
            b in "[A-Za-z][A-Za-z0-9]{0,8}",
            i in 0u64..50,
        ) {
            let name = format!("{b}[{i}]");
            let id = CanonicalId::format(IdKind::Artifact, &[&a], &name);
            let parsed = CanonicalId::parse(&id).unwrap();
            proptest::prop_assert_eq!(parsed.to_string(), id);
        }
    }
}
