//! The layered execution runner (§4.7): drives an
//! [`reelforge_plan::ExecutionPlan`] layer by layer, resolving inputs,
//! evaluating conditions, invoking the external `Produce` capability, and
//! recording every outcome to the event log.

pub mod model;
mod resolve;
mod runner;

pub use model::{
    CancellationToken, JobDescriptor, JobOutcome, JobRunRecord, ProduceRequest, ProduceResult,
    ProducedArtefact, ResolvedValue, RunSummary,
};
pub use resolve::required_artefact_ids;
pub use runner::Runner;

use thiserror::Error;

/// `Produce(request) -> result` (§6): the single external seam the runner
/// calls through. Concrete provider SDKs (OpenAI, Replicate, ...) are out of
/// scope; callers supply an adapter implementing this trait.
#[async_trait::async_trait]
pub trait Produce: Send + Sync {
    async fn produce(&self, request: ProduceRequest) -> ProduceResult;
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] reelforge_store::StoreError),
    #[error(transparent)]
    EventLog(#[from] reelforge_events::EventLogError),
    #[error(transparent)]
    Manifest(#[from] reelforge_manifest::ManifestError),
    #[error(transparent)]
    Hash(#[from] reelforge_hash::HashError),
    #[error("failed to decode stored JSON blob: {0}")]
    DecodeJson(#[source] serde_json::Error),
}
