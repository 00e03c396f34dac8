//! The orchestration entry point (§2, §3): wires the blueprint, expansion,
//! producer-graph, planning, and execution component crates together behind
//! one façade backed by a single [`reelforge_store::StorageBackend`].
//!
//! ```text
//! BlueprintTree -> BlueprintGraph -> CanonicalBlueprint -> ProducerGraph   (pure)
//! ProducerGraph + Manifest + EventLog + pendingEdits -> ExecutionPlan     (Engine::plan)
//! ExecutionPlan + EventLog + StorageContext + Produce -> RunSummary       (Engine::run)
//! ```
//!
//! Nothing here is mandatory: every step is also reachable directly through
//! its owning crate for a caller that wants finer control. `Engine` exists
//! so the common case — submit inputs, plan, run, repeat — reads as a
//! handful of calls instead of wiring six crates by hand each time.

mod config;
mod pipeline;
mod plan_options;
mod tracing_init;

pub use config::EngineConfig;
pub use pipeline::expand_to_producer_graph;
pub use plan_options::{PlanClock, PlanOptions};
pub use tracing_init::{init_tracing, LogFormat};

pub use reelforge_error::EngineError;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reelforge_blueprint::BlueprintTree;
use reelforge_events::{EventLog, InputEvent};
use reelforge_manifest::{Manifest, ManifestService};
use reelforge_plan::{compute_plan, ExecutionPlan, PlanRequest};
use reelforge_run::{CancellationToken, Produce, RunSummary, Runner};
use reelforge_store::{LocalBackend, MemoryBackend, StorageBackend, StorageContext};
use serde_json::Value;

/// A single movie's orchestrator, parameterised by its storage backend.
/// `Engine<LocalBackend>` persists to disk; `Engine<MemoryBackend>` is a
/// dry-run engine that never touches the filesystem (useful for planning
/// previews and tests).
pub struct Engine<B: StorageBackend> {
    ctx: StorageContext<B>,
    catalog: reelforge_producer::ProducerCatalog,
}

impl Engine<LocalBackend> {
    /// Storage rooted at `config.storage_root` on the real filesystem.
    pub fn local(config: EngineConfig) -> Self {
        let backend = LocalBackend::new(config.storage_root);
        Self::with_backend(backend, config.storage_base_path, config.movie_id, config.catalog)
    }
}

impl Engine<MemoryBackend> {
    /// An in-process engine backed by [`MemoryBackend`] — never touches
    /// disk, suited to planning dry-runs (§3 "StorageContext").
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::with_backend(MemoryBackend::new(), config.storage_base_path, config.movie_id, config.catalog)
    }
}

impl<B: StorageBackend> Engine<B> {
    pub fn with_backend(
        backend: B,
        storage_base_path: impl Into<camino::Utf8PathBuf>,
        movie_id: impl Into<String>,
        catalog: reelforge_producer::ProducerCatalog,
    ) -> Self {
        Self { ctx: StorageContext::new(backend, storage_base_path, movie_id), catalog }
    }

    pub fn event_log(&self) -> EventLog<'_, B> {
        EventLog::new(&self.ctx)
    }

    fn manifest_service(&self) -> ManifestService<'_, B> {
        ManifestService::new(&self.ctx)
    }

    /// Append one new `InputEvent` (§3 "EventLog"). Every engine method that
    /// reads inputs projects "latest wins" from the log itself, so this never
    /// mutates anything but the append-only stream.
    #[tracing::instrument(skip(self, value), fields(movie_id = %self.ctx.movie_id, input_id = %id))]
    pub async fn submit_input(&self, id: impl Into<String>, value: Value, now: DateTime<Utc>) -> Result<(), EngineError> {
        let id = id.into();
        let hash = reelforge_hash::hash_value(&value).map_err(|e| EngineError::InvalidInputValue(e.to_string()))?;
        let event = InputEvent { id, hash, value: Some(value), created_at: now };
        self.event_log().append_input(&event).await?;
        Ok(())
    }

    pub async fn submit_inputs(
        &self,
        values: impl IntoIterator<Item = (String, Value)>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        for (id, value) in values {
            self.submit_input(id, value, now).await?;
        }
        Ok(())
    }

    /// `loadCurrent(movieId)` (§4.8).
    pub async fn load_manifest(&self, now: DateTime<Utc>) -> Result<(Manifest, String), EngineError> {
        Ok(self.manifest_service().load_current(now).await?)
    }

    pub async fn save_manifest(&self, manifest: &Manifest, previous_hash: Option<&str>) -> Result<String, EngineError> {
        Ok(self.manifest_service().save_manifest(manifest, previous_hash).await?)
    }

    /// §4.6: diff the current manifest against the latest event-log
    /// projections (with `options.pending_edits` folded in) and lay out the
    /// resulting jobs into topologically-ordered layers.
    #[tracing::instrument(skip(self, tree, options), fields(movie_id = %self.ctx.movie_id, target_revision = %clock.target_revision))]
    pub async fn plan(
        &self,
        tree: &BlueprintTree,
        clock: PlanClock,
        options: PlanOptions,
    ) -> Result<ExecutionPlan, EngineError> {
        let event_log = self.event_log();
        let latest_inputs = event_log.latest_inputs().await?;
        let latest_artefacts = event_log.latest_artefacts().await?;

        let effective = reelforge_plan::effective_inputs(&latest_inputs, &options.pending_edits)
            .map_err(|e| EngineError::InvalidInputValue(e.to_string()))?;
        let input_values: BTreeMap<String, Value> =
            effective.into_iter().filter_map(|(id, eff)| eff.value.map(|value| (id, value))).collect();

        let (_graph, _canonical, producer_graph) = expand_to_producer_graph(tree, &input_values, &self.catalog)?;

        let (manifest, _hash) = self.load_manifest(clock.now).await?;

        let plan = compute_plan(&PlanRequest {
            manifest: &manifest,
            latest_inputs: &latest_inputs,
            latest_artefacts: &latest_artefacts,
            blueprint: &producer_graph,
            target_revision: clock.target_revision,
            pending_edits: options.pending_edits,
            re_run_from: options.re_run_from,
            artifact_regenerations: options.artifact_regenerations,
            up_to_layer: options.up_to_layer,
            collect_explanation: options.collect_explanation,
            created_at: clock.now,
        })?;

        Ok(plan)
    }

    /// §4.7: execute every layer of `plan` against `produce`, folding outcomes
    /// into the event log and returning the manifest rebuilt fresh from it.
    #[tracing::instrument(skip(self, plan, base_manifest, produce, cancellation), fields(movie_id = %self.ctx.movie_id, revision = %plan.revision))]
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        base_manifest: &Manifest,
        produce: &dyn Produce,
        cancellation: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, EngineError> {
        let runner = Runner::new(&self.ctx);
        Ok(runner.execute(plan, base_manifest, produce, cancellation, now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_blueprint::{
        ArtefactDecl, BlueprintDocument, DocumentMeta, EdgeDecl, InputDecl, ProducerDecl, ValueType,
    };
    use reelforge_events::{ArtefactStatus, Diagnostics};
    use reelforge_producer::{ProducerCatalog, ProducerCatalogEntry};
    use reelforge_run::{ProduceRequest, ProduceResult, ProducedArtefact};
    use reelforge_store::BlobInput;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn catalog_entry(provider: &str) -> ProducerCatalogEntry {
        ProducerCatalogEntry {
            provider: provider.into(),
            provider_model: "v1".into(),
            rate_key: format!("{provider}:v1"),
            sdk_mapping: None,
            selection_input_keys: Vec::new(),
            config_input_paths: Vec::new(),
            input_schema: None,
            output_schema: None,
        }
    }

    fn two_stage_tree() -> BlueprintTree {
        let mut root = BlueprintDocument { meta: DocumentMeta { id: "root".into(), name: "root".into() }, ..Default::default() };
        root.inputs.push(InputDecl { name: "Topic".into(), ty: ValueType::String, required: true, default: None, fan_in: false });
        root.artefacts.push(ArtefactDecl { name: "Script".into(), ty: ValueType::String, required: true, count_input: None, count_input_offset: 0, schema: None });
        root.producers.push(ProducerDecl { name: "ScriptWriter".into(), ..Default::default() });
        root.edges.push(EdgeDecl { from: "Topic".into(), to: "ScriptWriter".into(), conditions: None, group_by: None, order_by: None });
        root.edges.push(EdgeDecl { from: "ScriptWriter".into(), to: "Script".into(), conditions: None, group_by: None, order_by: None });
        BlueprintTree { root }
    }

    struct EchoProducer;

    #[async_trait::async_trait]
    impl Produce for EchoProducer {
        async fn produce(&self, request: ProduceRequest) -> ProduceResult {
            ProduceResult {
                job_id: request.job.job_id.clone(),
                status: ArtefactStatus::Succeeded,
                artefacts: vec![ProducedArtefact {
                    artefact_id: "Artifact:Script".to_string(),
                    status: Some(ArtefactStatus::Succeeded),
                    blob: Some(BlobInput { data: b"a script".to_vec(), mime_type: "text/plain".into() }),
                    diagnostics: None,
                }],
                diagnostics: None,
            }
        }
    }

    #[tokio::test]
    async fn submit_plan_run_round_trip_produces_every_job() {
        let catalog = ProducerCatalog::builder().register("ScriptWriter", catalog_entry("openai")).unwrap().build();
        let engine = Engine::in_memory(EngineConfig::new("storage", "storage", "movie-1", catalog));
        let tree = two_stage_tree();

        engine.submit_inputs(vec![("Input:Topic".to_string(), serde_json::json!("space"))], now()).await.unwrap();

        let plan = engine
            .plan(&tree, PlanClock { target_revision: "rev-0001".into(), now: now() }, PlanOptions::new())
            .await
            .unwrap();
        assert_eq!(plan.job_count(), 1);

        let (base_manifest, _hash) = engine.load_manifest(now()).await.unwrap();
        let cancellation = CancellationToken::new();
        let summary = engine.run(&plan, &base_manifest, &EchoProducer, &cancellation, now()).await.unwrap();
        assert_eq!(summary.jobs.len(), 1);

        engine.save_manifest(&summary.manifest, None).await.unwrap();
        let (loaded, _) = engine.load_manifest(now()).await.unwrap();
        assert!(loaded.artefacts.contains_key("Artifact:Script"));
    }

    #[tokio::test]
    async fn unregistered_producer_alias_surfaces_as_engine_error() {
        let catalog = ProducerCatalog::builder().build();
        let engine = Engine::in_memory(EngineConfig::new("storage", "storage", "movie-1", catalog));
        let tree = two_stage_tree();
        engine.submit_inputs(vec![("Input:Topic".to_string(), serde_json::json!("space"))], now()).await.unwrap();

        let err = engine
            .plan(&tree, PlanClock { target_revision: "rev-0001".into(), now: now() }, PlanOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_INPUT_SOURCE");
    }

    #[test]
    fn diagnostics_constructors_are_reachable_through_the_facade() {
        let _ = Diagnostics::cancelled();
    }
}
