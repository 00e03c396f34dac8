//! Parsing of edge-reference strings (e.g. `"scene[i].Script"`,
//! `"ReferenceImages[0]"`) into namespace-qualified segments with dimension
//! selectors, ahead of node resolution (§4.2).

use once_cell::sync::Lazy;
use reelforge_canon::{OwnedDimensionSelector, parse_dimension_selector};
use regex::Regex;

use crate::GraphBuildError;

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)((?:\[[^\[\]]+\])*)$").expect("static regex"));
static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSegment {
    pub name: String,
    pub selectors: Vec<OwnedDimensionSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub segments: Vec<RefSegment>,
}

impl ParsedReference {
    /// All segments but the last: the namespace path a reference descends
    /// through before reaching its target node.
    pub fn namespace_segments(&self) -> &[RefSegment] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    pub fn leaf(&self) -> &RefSegment {
        self.segments.last().expect("reference always has >=1 segment")
    }
}

/// Parse a dotted edge-reference string into segments, each with zero or
/// more bracketed dimension selectors.
pub fn parse_reference(raw: &str) -> Result<ParsedReference, GraphBuildError> {
    if raw.is_empty() {
        return Err(GraphBuildError::InvalidReference(raw.to_string()));
    }
    let mut segments = Vec::new();
    for part in raw.split('.') {
        let caps = SEGMENT_RE
            .captures(part)
            .ok_or_else(|| GraphBuildError::InvalidReference(raw.to_string()))?;
        let name = caps[1].to_string();
        let mut selectors = Vec::new();
        for bracket in BRACKET_RE.captures_iter(&caps[2]) {
            let token = &bracket[1];
            let selector = parse_dimension_selector(token)
                .map_err(|_| GraphBuildError::InvalidDimensionSelector(token.to_string()))?;
            selectors.push(selector);
        }
        segments.push(RefSegment { name, selectors });
    }
    Ok(ParsedReference { segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_name() {
        let r = parse_reference("Script").unwrap();
        assert_eq!(r.segments.len(), 1);
        assert_eq!(r.segments[0].name, "Script");
        assert!(r.segments[0].selectors.is_empty());
    }

    #[test]
    fn parses_namespaced_with_loop_selector() {
        let r = parse_reference("scene[i].Script").unwrap();
        assert_eq!(r.segments.len(), 2);
        assert_eq!(r.segments[0].name, "scene");
        assert_eq!(
            r.segments[0].selectors[0],
            OwnedDimensionSelector::Loop { symbol: "i".into(), offset: 0 }
        );
        assert_eq!(r.leaf().name, "Script");
    }

    #[test]
    fn parses_constant_indexed_leaf() {
        let r = parse_reference("ReferenceImages[0]").unwrap();
        assert_eq!(r.segments.len(), 1);
        assert_eq!(
            r.segments[0].selectors[0],
            OwnedDimensionSelector::Const { value: 0 }
        );
    }

    #[test]
    fn rejects_malformed_reference() {
        assert!(parse_reference("").is_err());
        assert!(parse_reference("..bad").is_err());
    }
}
