//! The append-only event log (§3 "EventLog", §4.7 step 9, §6).
//!
//! Two ordered, per-movie JSON-lines streams — `events/inputs.log` and
//! `events/artefacts.log` — are the authoritative source of truth for the
//! engine. Nothing is ever rewritten or deleted; "latest wins" is computed
//! by whoever reads the stream, never by mutating it in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reelforge_store::{BlobRef, StorageBackend, StorageContext, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to serialize event: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse event log line {line_no} in '{path}': {source}")]
    Parse {
        path: String,
        line_no: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Structured reason tags for artefact diagnostics (§7, §4.7), machine
/// checkable rather than a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticReason {
    UpstreamFailure,
    ConditionsNotMet,
    ProviderError,
    Cancelled,
    MissingInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub reason: DiagnosticReason,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "failedUpstreamArtifacts")]
    pub failed_upstream_artifacts: Vec<String>,
    #[serde(default)]
    pub retryable: Option<bool>,
}

impl Diagnostics {
    pub fn upstream_failure(failed_upstream_artifacts: Vec<String>) -> Self {
        Self {
            reason: DiagnosticReason::UpstreamFailure,
            message: None,
            failed_upstream_artifacts,
            retryable: None,
        }
    }

    pub fn conditions_not_met() -> Self {
        Self {
            reason: DiagnosticReason::ConditionsNotMet,
            message: None,
            failed_upstream_artifacts: Vec::new(),
            retryable: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            reason: DiagnosticReason::Cancelled,
            message: None,
            failed_upstream_artifacts: Vec::new(),
            retryable: None,
        }
    }

    /// A required, unconditional artefact input never succeeded (it is
    /// missing, failed, or was skipped) — the consuming job cannot run
    /// (open question in §4.7: a skipped producer's consumers fail rather
    /// than silently proceeding).
    pub fn missing_input(missing: Vec<String>) -> Self {
        Self {
            reason: DiagnosticReason::MissingInput,
            message: None,
            failed_upstream_artifacts: missing,
            retryable: None,
        }
    }

    pub fn provider_error(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason: DiagnosticReason::ProviderError,
            message: Some(message.into()),
            failed_upstream_artifacts: Vec::new(),
            retryable: Some(retryable),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    pub id: String,
    pub hash: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtefactStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtefactOutput {
    #[serde(default)]
    pub blob: Option<BlobRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactEvent {
    #[serde(rename = "artefactId")]
    pub artefact_id: String,
    pub revision: String,
    #[serde(rename = "inputsHash")]
    pub inputs_hash: String,
    pub output: ArtefactOutput,
    pub status: ArtefactStatus,
    #[serde(rename = "producedBy")]
    pub produced_by: String,
    #[serde(default)]
    pub diagnostics: Option<Diagnostics>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

const INPUTS_LOG_PATH: &str = "events/inputs.log";
const ARTEFACTS_LOG_PATH: &str = "events/artefacts.log";

/// Append-only per-movie event log, backed by a [`StorageBackend`].
pub struct EventLog<'a, B: StorageBackend> {
    ctx: &'a StorageContext<B>,
}

impl<'a, B: StorageBackend> EventLog<'a, B> {
    pub fn new(ctx: &'a StorageContext<B>) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip(self, event), fields(movie_id = %self.ctx.movie_id, input_id = %event.id))]
    pub async fn append_input(&self, event: &InputEvent) -> Result<(), EventLogError> {
        self.append_line(INPUTS_LOG_PATH, event).await
    }

    #[tracing::instrument(skip(self, event), fields(movie_id = %self.ctx.movie_id, artefact_id = %event.artefact_id, status = ?event.status))]
    pub async fn append_artefact(&self, event: &ArtefactEvent) -> Result<(), EventLogError> {
        self.append_line(ARTEFACTS_LOG_PATH, event).await
    }

    async fn append_line<T: Serialize>(
        &self,
        relative: &str,
        event: &T,
    ) -> Result<(), EventLogError> {
        let path = self.ctx.resolve(&[relative]);
        let mut line = serde_json::to_string(event).map_err(EventLogError::Serialize)?;
        line.push('\n');
        let existing = match self.ctx.backend.read_bytes(&path).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut combined = existing;
        combined.extend_from_slice(line.as_bytes());
        self.ctx.backend.write(&path, &combined).await?;
        Ok(())
    }

    pub async fn read_all_inputs(&self) -> Result<Vec<InputEvent>, EventLogError> {
        self.read_all(INPUTS_LOG_PATH).await
    }

    pub async fn read_all_artefacts(&self) -> Result<Vec<ArtefactEvent>, EventLogError> {
        self.read_all(ARTEFACTS_LOG_PATH).await
    }

    async fn read_all<T: for<'de> Deserialize<'de>>(
        &self,
        relative: &str,
    ) -> Result<Vec<T>, EventLogError> {
        let path = self.ctx.resolve(&[relative]);
        let content = match self.ctx.backend.read_string(&path).await {
            Ok(s) => s,
            Err(StoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: T = serde_json::from_str(line).map_err(|source| EventLogError::Parse {
                path: path.to_string(),
                line_no,
                source,
            })?;
            out.push(event);
        }
        Ok(out)
    }

    /// The latest `InputEvent` per input id, in append order ("latest wins",
    /// §3).
    pub async fn latest_inputs(&self) -> Result<BTreeMap<String, InputEvent>, EventLogError> {
        let mut latest = BTreeMap::new();
        for event in self.read_all_inputs().await? {
            latest.insert(event.id.clone(), event);
        }
        Ok(latest)
    }

    /// The latest `ArtefactEvent` per artefact id, regardless of status —
    /// used by the upstream-failure gate and dirty detection, which must see
    /// `failed`/`skipped` entries too, not only succeeded ones.
    pub async fn latest_artefacts(&self) -> Result<BTreeMap<String, ArtefactEvent>, EventLogError> {
        let mut latest = BTreeMap::new();
        for event in self.read_all_artefacts().await? {
            latest.insert(event.artefact_id.clone(), event);
        }
        Ok(latest)
    }

    pub async fn latest_artefact(
        &self,
        artefact_id: &str,
    ) -> Result<Option<ArtefactEvent>, EventLogError> {
        Ok(self.latest_artefacts().await?.remove(artefact_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_store::MemoryBackend;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn append_only_latest_input_wins() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let log = EventLog::new(&ctx);
        log.append_input(&InputEvent {
            id: "Input:Topic".into(),
            hash: "h1".into(),
            value: Some(serde_json::json!("space")),
            created_at: now(),
        })
        .await
        .unwrap();
        log.append_input(&InputEvent {
            id: "Input:Topic".into(),
            hash: "h2".into(),
            value: Some(serde_json::json!("ocean")),
            created_at: now(),
        })
        .await
        .unwrap();
        let latest = log.latest_inputs().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["Input:Topic"].hash, "h2");
        // Append-only: every event ever written is still present (§8 property 7).
        assert_eq!(log.read_all_inputs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_artefact_status_any_kind_is_authoritative() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let log = EventLog::new(&ctx);
        log.append_artefact(&ArtefactEvent {
            artefact_id: "Artifact:Script".into(),
            revision: "rev-0001".into(),
            inputs_hash: "ih1".into(),
            output: ArtefactOutput {
                blob: Some(BlobRef {
                    hash: "bh1".into(),
                    size: 10,
                    mime_type: "text/plain".into(),
                }),
            },
            status: ArtefactStatus::Succeeded,
            produced_by: "Producer:Script".into(),
            diagnostics: None,
            created_at: now(),
        })
        .await
        .unwrap();
        log.append_artefact(&ArtefactEvent {
            artefact_id: "Artifact:Script".into(),
            revision: "rev-0002".into(),
            inputs_hash: "ih2".into(),
            output: ArtefactOutput::default(),
            status: ArtefactStatus::Failed,
            produced_by: "Producer:Script".into(),
            diagnostics: Some(Diagnostics::provider_error("boom", true)),
            created_at: now(),
        })
        .await
        .unwrap();
        let latest = log.latest_artefact("Artifact:Script").await.unwrap().unwrap();
        assert_eq!(latest.status, ArtefactStatus::Failed);
    }

    #[tokio::test]
    async fn reading_a_missing_log_yields_empty() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let log = EventLog::new(&ctx);
        assert!(log.read_all_inputs().await.unwrap().is_empty());
        assert!(log.latest_artefacts().await.unwrap().is_empty());
    }
}
