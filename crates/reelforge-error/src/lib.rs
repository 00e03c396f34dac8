//! The pipeline engine's error taxonomy (§7): categorised, stable-coded
//! errors that every component crate's local error type ultimately maps
//! into at the point it crosses into caller-facing code (the planner, the
//! runner, the engine facade).
//!
//! Component crates keep their own narrow `thiserror` enums (`GraphBuildError`,
//! `ExpandError`, `ProducerError`, `EventLogError`, `ManifestError`,
//! `StoreError`, `CanonError`) so each crate stays a leaf with its own
//! vocabulary; [`EngineError`] is where those vocabularies get a stable code
//! and a category a caller can filter or translate on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five error categories from §7. `Provider` and `Warning` never abort
/// plan generation or a run — they are recorded as diagnostics on an
/// artefact event (§4.7 step 9, §7 "Propagation policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Parser,
    Validation,
    Runtime,
    Provider,
    Warning,
}

/// Implemented by [`EngineError`] so callers can filter/translate on a
/// stable code without matching every variant (§7 "User-visible behaviour").
pub trait CodedError {
    fn code(&self) -> &'static str;
    fn category(&self) -> ErrorCategory;
}

/// Every stable error code from §7, carrying the human message that
/// explains the specific violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // --- Parser ---
    #[error("[INVALID_REFERENCE] {0}")]
    InvalidReference(String),
    #[error("[INVALID_DIMENSION_SELECTOR] {0}")]
    InvalidDimensionSelector(String),

    // --- Validation ---
    #[error("[BLUEPRINT_VALIDATION_FAILED] {0}")]
    BlueprintValidationFailed(String),
    #[error("[UNKNOWN_NAMESPACE] {0}")]
    UnknownNamespace(String),
    #[error("[UNKNOWN_INPUT] {0}")]
    UnknownInput(String),

    // --- Runtime (planning/expansion) ---
    #[error("[GRAPH_BUILD_ERROR] {0}")]
    GraphBuildError(String),
    #[error("[GRAPH_EXPANSION_ERROR] {0}")]
    GraphExpansionError(String),
    #[error("[MISSING_DIMENSION_SIZE] {0}")]
    MissingDimensionSize(String),
    #[error("[MISSING_DIMENSION_INDEX] {0}")]
    MissingDimensionIndex(String),
    #[error("[MISSING_INPUT_SOURCE] {0}")]
    MissingInputSource(String),
    #[error("[MISSING_REQUIRED_INPUT] {0}")]
    MissingRequiredInput(String),
    #[error("[INVALID_INPUT_VALUE] {0}")]
    InvalidInputValue(String),
    #[error("[MULTIPLE_UPSTREAM_INPUTS] {0}")]
    MultipleUpstreamInputs(String),
    #[error("[ALIAS_CYCLE_DETECTED] {0}")]
    AliasCycleDetected(String),
    #[error("[INVALID_INPUT_BINDING] {0}")]
    InvalidInputBinding(String),
    #[error("[UNKNOWN_NODE_KIND] {0}")]
    UnknownNodeKind(String),
    #[error("[CYCLIC_DEPENDENCY] {0}")]
    CyclicDependency(String),
    #[error("[ARTIFACT_NOT_IN_MANIFEST] {0}")]
    ArtifactNotInManifest(String),
    #[error("[ARTIFACT_RESOLUTION_FAILED] {0}")]
    ArtifactResolutionFailed(String),
    #[error("[MISSING_BLOB_PAYLOAD] {0}")]
    MissingBlobPayload(String),

    // --- Provider (never aborts; see module docs) ---
    #[error("[PROVIDER_ERROR] {message} (retryable={retryable})")]
    Provider { message: String, retryable: bool },

    // --- Warning (diagnostics only; never changes exit codes, §7) ---
    #[error("[WARNING] {0}")]
    Warning(String),
}

impl CodedError for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "INVALID_REFERENCE",
            Self::InvalidDimensionSelector(_) => "INVALID_DIMENSION_SELECTOR",
            Self::BlueprintValidationFailed(_) => "BLUEPRINT_VALIDATION_FAILED",
            Self::UnknownNamespace(_) => "UNKNOWN_NAMESPACE",
            Self::UnknownInput(_) => "UNKNOWN_INPUT",
            Self::GraphBuildError(_) => "GRAPH_BUILD_ERROR",
            Self::GraphExpansionError(_) => "GRAPH_EXPANSION_ERROR",
            Self::MissingDimensionSize(_) => "MISSING_DIMENSION_SIZE",
            Self::MissingDimensionIndex(_) => "MISSING_DIMENSION_INDEX",
            Self::MissingInputSource(_) => "MISSING_INPUT_SOURCE",
            Self::MissingRequiredInput(_) => "MISSING_REQUIRED_INPUT",
            Self::InvalidInputValue(_) => "INVALID_INPUT_VALUE",
            Self::MultipleUpstreamInputs(_) => "MULTIPLE_UPSTREAM_INPUTS",
            Self::AliasCycleDetected(_) => "ALIAS_CYCLE_DETECTED",
            Self::InvalidInputBinding(_) => "INVALID_INPUT_BINDING",
            Self::UnknownNodeKind(_) => "UNKNOWN_NODE_KIND",
            Self::CyclicDependency(_) => "CYCLIC_DEPENDENCY",
            Self::ArtifactNotInManifest(_) => "ARTIFACT_NOT_IN_MANIFEST",
            Self::ArtifactResolutionFailed(_) => "ARTIFACT_RESOLUTION_FAILED",
            Self::MissingBlobPayload(_) => "MISSING_BLOB_PAYLOAD",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Warning(_) => "WARNING",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidReference(_) | Self::InvalidDimensionSelector(_) => ErrorCategory::Parser,
            Self::BlueprintValidationFailed(_) | Self::UnknownNamespace(_) | Self::UnknownInput(_) => {
                ErrorCategory::Validation
            }
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Warning(_) => ErrorCategory::Warning,
            _ => ErrorCategory::Runtime,
        }
    }
}

impl From<reelforge_canon::CanonError> for EngineError {
    fn from(e: reelforge_canon::CanonError) -> Self {
        use reelforge_canon::CanonError::*;
        match e {
            InvalidDimensionSelector(_) | NumericSelectorInDeclaration(_) => {
                Self::InvalidDimensionSelector(e.to_string())
            }
            _ => Self::InvalidReference(e.to_string()),
        }
    }
}

impl From<reelforge_graph::GraphBuildError> for EngineError {
    fn from(e: reelforge_graph::GraphBuildError) -> Self {
        use reelforge_graph::GraphBuildError::*;
        match e {
            InvalidReference(_) => Self::InvalidReference(e.to_string()),
            InvalidDimensionSelector(_) => Self::InvalidDimensionSelector(e.to_string()),
            UnknownNamespace(_) => Self::UnknownNamespace(e.to_string()),
            ConflictingDimensionLineage { .. } => Self::GraphBuildError(e.to_string()),
        }
    }
}

impl From<reelforge_expand::ExpandError> for EngineError {
    fn from(e: reelforge_expand::ExpandError) -> Self {
        use reelforge_expand::ExpandError::*;
        match e {
            MissingDimensionSize(_) => Self::MissingDimensionSize(e.to_string()),
            InvalidDimensionSize(_) => Self::InvalidInputValue(e.to_string()),
            ConflictingDimensionSize { .. } | GraphExpansionError(_) => Self::GraphExpansionError(e.to_string()),
            MultipleUpstreamInputs(_) => Self::MultipleUpstreamInputs(e.to_string()),
            AliasCycleDetected(_) => Self::AliasCycleDetected(e.to_string()),
        }
    }
}

impl From<reelforge_producer::ProducerError> for EngineError {
    fn from(e: reelforge_producer::ProducerError) -> Self {
        use reelforge_producer::ProducerError::*;
        match e {
            DuplicateProducerAlias(_) => Self::BlueprintValidationFailed(e.to_string()),
            UnknownProducerAlias(_) => Self::MissingInputSource(e.to_string()),
            UnknownNode(_) => Self::UnknownNodeKind(e.to_string()),
        }
    }
}

impl From<reelforge_events::EventLogError> for EngineError {
    fn from(e: reelforge_events::EventLogError) -> Self {
        Self::ArtifactResolutionFailed(e.to_string())
    }
}

impl From<reelforge_manifest::ManifestError> for EngineError {
    fn from(e: reelforge_manifest::ManifestError) -> Self {
        Self::ArtifactResolutionFailed(e.to_string())
    }
}

impl From<reelforge_store::StoreError> for EngineError {
    fn from(e: reelforge_store::StoreError) -> Self {
        Self::ArtifactResolutionFailed(e.to_string())
    }
}

impl From<reelforge_plan::PlanError> for EngineError {
    fn from(e: reelforge_plan::PlanError) -> Self {
        use reelforge_plan::PlanError::*;
        match e {
            CyclicDependency => Self::CyclicDependency(e.to_string()),
            UnknownSourceJob(_) => Self::ArtifactNotInManifest(e.to_string()),
            Hash(_) => Self::ArtifactResolutionFailed(e.to_string()),
        }
    }
}

impl From<reelforge_run::RunError> for EngineError {
    fn from(e: reelforge_run::RunError) -> Self {
        use reelforge_run::RunError::*;
        match e {
            Store(_) | EventLog(_) | Manifest(_) | Hash(_) | DecodeJson(_) => {
                Self::ArtifactResolutionFailed(e.to_string())
            }
        }
    }
}
