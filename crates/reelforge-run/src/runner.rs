//! The layered execution runner (§4.7): walks an [`ExecutionPlan`]'s layers
//! in order, resolving, gating, and invoking `Produce` for each job, folding
//! every outcome into the event log and a running copy of the manifest as it
//! goes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reelforge_events::{ArtefactEvent, ArtefactOutput, ArtefactStatus, Diagnostics, EventLog};
use reelforge_hash::ArtefactHashInput;
use reelforge_manifest::{Manifest, ManifestArtefactEntry};
use reelforge_plan::{EffectiveInput, ExecutionPlan};
use reelforge_producer::ProducerJob;
use reelforge_store::{persist_blob_to_storage, StorageBackend, StorageContext};

use crate::model::{CancellationToken, JobDescriptor, JobOutcome, JobRunRecord, ProduceRequest, ResolvedValue, RunSummary};
use crate::{resolve, Produce, RunError};

/// Runs an [`ExecutionPlan`] to completion against a storage context and a
/// `Produce` capability.
pub struct Runner<'a, B: StorageBackend> {
    ctx: &'a StorageContext<B>,
}

impl<'a, B: StorageBackend> Runner<'a, B> {
    pub fn new(ctx: &'a StorageContext<B>) -> Self {
        Self { ctx }
    }

    /// §4.7 steps 1-11. `base_manifest` is the manifest the plan was
    /// computed against; the runner folds each succeeded artefact into its
    /// own copy as jobs complete (step 11), so a job later in the same run
    /// sees its upstream's freshly-produced hash rather than the stale
    /// pre-run value. The final [`RunSummary::manifest`] is always rebuilt
    /// fresh from the event log (step "after all layers"), never derived
    /// from the running copy directly.
    #[tracing::instrument(skip(self, plan, base_manifest, produce, cancellation), fields(movie_id = %self.ctx.movie_id, revision = %plan.revision, jobs = plan.job_count()))]
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        base_manifest: &Manifest,
        produce: &dyn Produce,
        cancellation: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, RunError> {
        let event_log = EventLog::new(self.ctx);
        let mut running_manifest = base_manifest.clone();

        let latest_inputs = event_log.latest_inputs().await?;
        let effective = reelforge_plan::effective_inputs(&latest_inputs, &[])?;

        let mut job_records = Vec::new();

        'layers: for (layer_index, layer) in plan.layers.iter().enumerate() {
            for job in layer {
                if cancellation.is_cancelled() {
                    tracing::info!(job_id = %job.job_id, "run cancelled before job started");
                    break 'layers;
                }

                let record = self
                    .execute_job(&event_log, job, layer_index, &effective, &mut running_manifest, &plan.revision, produce, cancellation, now)
                    .await?;
                job_records.push(record);
            }
        }

        let manifest = reelforge_manifest::ManifestService::new(self.ctx)
            .build_from_events(&event_log, &plan.revision, Some(base_manifest.revision.as_str()), now)
            .await?;

        Ok(RunSummary { revision: plan.revision.clone(), jobs: job_records, manifest })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_job(
        &self,
        event_log: &EventLog<'_, B>,
        job: &ProducerJob,
        layer_index: usize,
        effective: &BTreeMap<String, EffectiveInput>,
        running_manifest: &mut Manifest,
        revision: &str,
        produce: &dyn Produce,
        cancellation: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, RunError> {
        let inputs_hash = reelforge_plan::hash_job_input_contents(job, effective, running_manifest)?;

        // Steps 1-2: gather required artefact ids, fail the job if any is
        // itself already failed upstream.
        let required = resolve::required_artefact_ids(job);
        let mut failed_upstream: Vec<String> = Vec::new();
        for id in &required {
            if let Some(event) = event_log.latest_artefact(id).await? {
                if event.status == ArtefactStatus::Failed {
                    failed_upstream.push(id.clone());
                }
            }
        }
        if !failed_upstream.is_empty() {
            failed_upstream.sort();
            let diagnostics = Diagnostics::upstream_failure(failed_upstream);
            return self.fail_job(event_log, job, revision, &inputs_hash, diagnostics, now).await;
        }

        // Step 3: resolve required artefacts from the event log.
        let mut resolved_inputs = resolve::resolve_required_artefacts(self.ctx, event_log, &required).await?;

        // Open question (§4.7): a required, unconditional artefact input
        // that never succeeded fails the job outright rather than letting
        // it proceed as if the input were absent.
        let missing = resolve::missing_unconditional_required(job, &resolved_inputs);
        if !missing.is_empty() {
            let diagnostics = Diagnostics::missing_input(missing);
            return self.fail_job(event_log, job, revision, &inputs_hash, diagnostics, now).await;
        }

        // Step 4: evaluate input conditions, tracking which inputs survive.
        let env = resolve::condition_env(&resolved_inputs);
        let mut any_conditional_satisfied = false;
        let mut has_unconditional_input = false;
        let mut surviving_inputs: Vec<String> = Vec::new();
        for input_id in &job.inputs {
            match job.context.input_conditions.get(input_id) {
                Some(condition) => {
                    if reelforge_condition::evaluate_condition(&condition.condition, &env) {
                        any_conditional_satisfied = true;
                        surviving_inputs.push(input_id.clone());
                    }
                }
                None => {
                    has_unconditional_input = true;
                    surviving_inputs.push(input_id.clone());
                }
            }
        }
        if !any_conditional_satisfied && !has_unconditional_input {
            return self.skip_job(event_log, job, revision, &inputs_hash, now).await;
        }

        // Step 5: materialise fan-in groups.
        for (target_id, descriptor) in &job.context.fan_in {
            let value = reelforge_condition::materialise_fan_in(descriptor);
            resolved_inputs.insert(target_id.clone(), ResolvedValue::FanIn(value));
        }
        resolved_inputs.retain(|id, _| surviving_inputs.contains(id) || job.context.fan_in.contains_key(id));

        // Step 6: locate asset blob paths hiding inside resolved scalars.
        let asset_blob_paths = resolve::resolve_asset_blob_paths(self.ctx, event_log, &resolved_inputs).await?;

        // Step 7: resolve any remaining BlobRefs to BlobInputs.
        resolve::materialise_blob_inputs(self.ctx, &mut resolved_inputs).await?;

        if cancellation.is_cancelled() {
            let diagnostics = Diagnostics::cancelled();
            return self.fail_job(event_log, job, revision, &inputs_hash, diagnostics, now).await;
        }

        let mut context = job.context.clone();
        context.extras.resolved_inputs = Some(serde_json::json!(resolved_inputs
            .iter()
            .map(|(id, value)| (id.clone(), value.as_condition_value()))
            .collect::<BTreeMap<String, serde_json::Value>>()));
        context.extras.asset_blob_paths = Some(serde_json::json!(asset_blob_paths));

        let descriptor = JobDescriptor {
            job_id: job.job_id.clone(),
            producer: job.producer.clone(),
            provider: job.provider.clone(),
            provider_model: job.provider_model.clone(),
            rate_key: job.rate_key.clone(),
            resolved_inputs,
            asset_blob_paths,
            context,
        };

        let request = ProduceRequest {
            movie_id: self.ctx.movie_id.clone(),
            job: descriptor,
            layer_index,
            attempt: 1,
            revision: revision.to_string(),
        };

        tracing::debug!(job_id = %job.job_id, layer = layer_index, "invoking produce");
        let result = produce.produce(request).await;

        // Steps 9-11: record each produced artefact, fold succeeded ones
        // into the running manifest, and derive the job's overall outcome.
        let mut any_failed = result.status == ArtefactStatus::Failed;
        let mut succeeded_count = 0usize;
        let mut skipped_count = 0usize;
        let mut produced_ids = Vec::new();

        for artefact_id in &job.produces {
            let produced = result.artefacts.iter().find(|a| &a.artefact_id == artefact_id);
            let status = produced.and_then(|p| p.status).unwrap_or(result.status);

            match status {
                ArtefactStatus::Succeeded => {
                    let Some(blob) = produced.and_then(|p| p.blob.as_ref()) else {
                        any_failed = true;
                        let diagnostics = Diagnostics::provider_error(
                            format!("producer reported '{artefact_id}' succeeded with no blob payload"),
                            false,
                        );
                        self.append_artefact(
                            event_log, artefact_id, revision, &inputs_hash, ArtefactStatus::Failed, job,
                            ArtefactOutput::default(), Some(diagnostics), now,
                        )
                        .await?;
                        continue;
                    };
                    let blob_ref = persist_blob_to_storage(self.ctx, &blob.data, Some(&blob.mime_type)).await?;
                    let output = ArtefactOutput { blob: Some(blob_ref.clone()) };
                    self.append_artefact(
                        event_log, artefact_id, revision, &inputs_hash, ArtefactStatus::Succeeded, job,
                        output, None, now,
                    )
                    .await?;

                    let hash = reelforge_hash::derive_artefact_hash(&ArtefactHashInput {
                        artefact_id,
                        inputs_hash: &inputs_hash,
                        status: "succeeded",
                        blob_hash: Some(&blob_ref.hash),
                        blob_size: Some(blob_ref.size),
                        blob_mime_type: Some(&blob_ref.mime_type),
                    })?;
                    running_manifest.artefacts.insert(
                        artefact_id.clone(),
                        ManifestArtefactEntry {
                            hash,
                            blob: Some(blob_ref),
                            produced_by: job.job_id.clone(),
                            status: ArtefactStatus::Succeeded,
                            inputs_hash: inputs_hash.clone(),
                            diagnostics: None,
                            created_at: now,
                        },
                    );
                    succeeded_count += 1;
                    produced_ids.push(artefact_id.clone());
                }
                ArtefactStatus::Failed => {
                    any_failed = true;
                    let diagnostics = produced
                        .and_then(|p| p.diagnostics.clone())
                        .or_else(|| result.diagnostics.clone())
                        .unwrap_or_else(|| Diagnostics::provider_error("producer reported failure", false));
                    self.append_artefact(
                        event_log, artefact_id, revision, &inputs_hash, ArtefactStatus::Failed, job,
                        ArtefactOutput::default(), Some(diagnostics), now,
                    )
                    .await?;
                }
                ArtefactStatus::Skipped => {
                    skipped_count += 1;
                    let diagnostics = produced.and_then(|p| p.diagnostics.clone());
                    self.append_artefact(
                        event_log, artefact_id, revision, &inputs_hash, ArtefactStatus::Skipped, job,
                        ArtefactOutput::default(), diagnostics, now,
                    )
                    .await?;
                }
            }
        }

        let outcome = if any_failed {
            JobOutcome::Failed
        } else if !job.produces.is_empty() && skipped_count == job.produces.len() && result.status != ArtefactStatus::Succeeded {
            JobOutcome::Skipped
        } else {
            let _ = succeeded_count;
            JobOutcome::Succeeded
        };

        Ok(JobRunRecord { job_id: job.job_id.clone(), outcome, produced: produced_ids })
    }

    async fn fail_job(
        &self,
        event_log: &EventLog<'_, B>,
        job: &ProducerJob,
        revision: &str,
        inputs_hash: &str,
        diagnostics: Diagnostics,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, RunError> {
        for artefact_id in &job.produces {
            self.append_artefact(
                event_log, artefact_id, revision, inputs_hash, ArtefactStatus::Failed, job,
                ArtefactOutput::default(), Some(diagnostics.clone()), now,
            )
            .await?;
        }
        Ok(JobRunRecord { job_id: job.job_id.clone(), outcome: JobOutcome::Failed, produced: Vec::new() })
    }

    async fn skip_job(
        &self,
        event_log: &EventLog<'_, B>,
        job: &ProducerJob,
        revision: &str,
        inputs_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, RunError> {
        let diagnostics = Diagnostics::conditions_not_met();
        for artefact_id in &job.produces {
            self.append_artefact(
                event_log, artefact_id, revision, inputs_hash, ArtefactStatus::Skipped, job,
                ArtefactOutput::default(), Some(diagnostics.clone()), now,
            )
            .await?;
        }
        Ok(JobRunRecord { job_id: job.job_id.clone(), outcome: JobOutcome::Skipped, produced: Vec::new() })
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_artefact(
        &self,
        event_log: &EventLog<'_, B>,
        artefact_id: &str,
        revision: &str,
        inputs_hash: &str,
        status: ArtefactStatus,
        job: &ProducerJob,
        output: ArtefactOutput,
        diagnostics: Option<Diagnostics>,
        now: DateTime<Utc>,
    ) -> Result<(), RunError> {
        let event = ArtefactEvent {
            artefact_id: artefact_id.to_string(),
            revision: revision.to_string(),
            inputs_hash: inputs_hash.to_string(),
            output,
            status,
            produced_by: job.job_id.clone(),
            diagnostics,
            created_at: now,
        };
        event_log.append_artefact(&event).await?;
        Ok(())
    }
}
