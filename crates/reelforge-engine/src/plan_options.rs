//! Caller-facing request shape for [`crate::Engine::plan`] — the engine's
//! own view of [`reelforge_plan::PlanRequest`], minus the pieces the engine
//! fills in itself (the manifest and event-log projections).

use chrono::{DateTime, Utc};
use reelforge_plan::{ArtifactRegeneration, PendingEdit};

/// Everything a caller may want to vary about one `plan()` call (§4.6).
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub pending_edits: Vec<PendingEdit>,
    /// Force every job from this layer onward into the plan (§4.6 step 5),
    /// ignored when `artifact_regenerations` is non-empty.
    pub re_run_from: Option<usize>,
    pub artifact_regenerations: Vec<ArtifactRegeneration>,
    /// Trim the plan to layers `0..=up_to_layer` after all other selection
    /// logic has run.
    pub up_to_layer: Option<usize>,
    /// Attach a [`reelforge_plan::PlanExplanation`] to the result.
    pub collect_explanation: bool,
}

impl PlanOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The next revision label to target, and the clock value to stamp new
/// records with. Kept separate from [`PlanOptions`] since every caller
/// supplies these, where the rest are opt-in overrides.
#[derive(Debug, Clone)]
pub struct PlanClock {
    pub target_revision: String,
    pub now: DateTime<Utc>,
}
