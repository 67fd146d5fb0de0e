//! crates/talki_core/src/phrase_pipeline.rs
//!
//! The asynchronous phrase generation pipeline. A freshly created material is
//! handed to [`PhraseJobs`], which runs [`PhrasePipeline::run`] as a tracked
//! background job. Whatever happens inside the job, the material ends in a
//! terminal status: `completed` with its full phrase set, or `failed` with none.

use crate::domain::{Importance, MaterialStatus, Phrase};
use crate::locks::KeyedLocks;
use crate::ports::{GenerationService, MaterialStore, PhraseStore, PortError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Why a pipeline run ended in `failed`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineFailure {
    #[error("material could not be loaded: {0}")]
    MaterialUnavailable(PortError),
    #[error("material has no content to generate from")]
    EmptyContent,
    #[error("could not clear previously stored phrases: {0}")]
    Cleanup(PortError),
    #[error("phrase generation failed: {0}")]
    Generation(PortError),
    #[error("generation returned no phrases")]
    NoPhrases,
    #[error("failed to store phrase {index}: {source}")]
    Persistence { index: usize, source: PortError },
    #[error("exceeded the {0:?} execution budget")]
    TimedOut(Duration),
    #[error("cancelled before completion")]
    Cancelled,
}

/// The importance assigned to every generated phrase. A constant for now.
pub fn importance_for(_text: &str) -> Importance {
    Importance::High
}

//=========================================================================================
// The Pipeline
//=========================================================================================

pub struct PhrasePipeline {
    materials: Arc<dyn MaterialStore>,
    phrases: Arc<dyn PhraseStore>,
    generator: Arc<dyn GenerationService>,
    budget: Duration,
    locks: KeyedLocks,
}

impl PhrasePipeline {
    pub fn new(
        materials: Arc<dyn MaterialStore>,
        phrases: Arc<dyn PhraseStore>,
        generator: Arc<dyn GenerationService>,
        budget: Duration,
    ) -> Self {
        Self {
            materials,
            phrases,
            generator,
            budget,
            locks: KeyedLocks::new(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Generates and stores phrases for one material, returning the terminal
    /// status that was written. Runs for the same material never interleave.
    pub async fn run(
        &self,
        material_id: Uuid,
        owner_uid: &str,
        cancel: &CancellationToken,
    ) -> MaterialStatus {
        let _guard = self.locks.lock(material_id).await;

        // Nothing is written until the material is known to be the caller's.
        let material = match self.materials.get_material(material_id, owner_uid).await {
            Ok(material) => material,
            Err(e @ PortError::NotFound(_)) => {
                error!(
                    "Phrase generation skipped for material {}: {}",
                    material_id,
                    PipelineFailure::MaterialUnavailable(e)
                );
                return MaterialStatus::Failed;
            }
            Err(e) => {
                return self
                    .fail(material_id, PipelineFailure::MaterialUnavailable(e))
                    .await
            }
        };

        if let Err(e) = self
            .materials
            .update_material_status(material_id, MaterialStatus::Processing)
            .await
        {
            warn!("Could not mark material {} as processing: {}", material_id, e);
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(PipelineFailure::Cancelled),
            result = timeout(self.budget, self.generate_and_store(material_id, &material.content)) => {
                result.unwrap_or(Err(PipelineFailure::TimedOut(self.budget)))
            }
        };

        match outcome {
            Ok(count) => {
                info!("Stored {} phrases for material {}.", count, material_id);
                self.write_status(material_id, MaterialStatus::Completed).await
            }
            Err(failure) => self.fail(material_id, failure).await,
        }
    }

    /// Records `failed` for a material whose job died without reaching a terminal write.
    pub async fn mark_failed(&self, material_id: Uuid) {
        self.discard_phrases(material_id).await;
        self.write_status(material_id, MaterialStatus::Failed).await;
    }

    async fn generate_and_store(
        &self,
        material_id: Uuid,
        content: &str,
    ) -> Result<usize, PipelineFailure> {
        if content.trim().is_empty() {
            return Err(PipelineFailure::EmptyContent);
        }

        // A retry starts from scratch.
        let stale = self
            .phrases
            .delete_phrases_for_material(material_id)
            .await
            .map_err(PipelineFailure::Cleanup)?;
        if stale > 0 {
            info!("Discarded {} stale phrases for material {}.", stale, material_id);
        }

        let texts = self
            .generator
            .generate_phrases(content)
            .await
            .map_err(PipelineFailure::Generation)?;
        if texts.is_empty() {
            return Err(PipelineFailure::NoPhrases);
        }

        for (index, text) in texts.iter().enumerate() {
            let phrase = Phrase {
                id: Uuid::new_v4(),
                material_id,
                text: text.clone(),
                importance: importance_for(text),
                created_at: Utc::now(),
            };
            self.phrases
                .create_phrase(phrase)
                .await
                .map_err(|source| PipelineFailure::Persistence { index, source })?;
        }

        Ok(texts.len())
    }

    async fn fail(&self, material_id: Uuid, failure: PipelineFailure) -> MaterialStatus {
        error!("Phrase generation failed for material {}: {}", material_id, failure);
        self.discard_phrases(material_id).await;
        self.write_status(material_id, MaterialStatus::Failed).await
    }

    async fn discard_phrases(&self, material_id: Uuid) {
        if let Err(e) = self.phrases.delete_phrases_for_material(material_id).await {
            error!(
                "Failed to discard partial phrases for material {}: {}",
                material_id, e
            );
        }
    }

    async fn write_status(&self, material_id: Uuid, status: MaterialStatus) -> MaterialStatus {
        if let Err(e) = self
            .materials
            .update_material_status(material_id, status)
            .await
        {
            error!(
                "Failed to record status '{}' for material {}: {}",
                status, material_id, e
            );
        }
        status
    }
}

//=========================================================================================
// Background Jobs
//=========================================================================================

/// Spawns pipeline runs as tracked background jobs.
#[derive(Clone)]
pub struct PhraseJobs {
    pipeline: Arc<PhrasePipeline>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl PhraseJobs {
    pub fn new(pipeline: Arc<PhrasePipeline>) -> Self {
        Self {
            pipeline,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<PhrasePipeline> {
        &self.pipeline
    }

    /// Starts generation for a material without waiting for it. The handle
    /// resolves to the terminal status once the job ends.
    pub fn spawn(&self, material_id: Uuid, owner_uid: String) -> JoinHandle<MaterialStatus> {
        let pipeline = self.pipeline.clone();
        let cancel = self.shutdown.child_token();
        let span = info_span!("phrase_job", %material_id, owner = %owner_uid);

        self.tracker.spawn(
            async move {
                info!("Spawning background phrase generation.");
                let run = {
                    let pipeline = pipeline.clone();
                    tokio::spawn(
                        async move { pipeline.run(material_id, &owner_uid, &cancel).await }
                            .in_current_span(),
                    )
                };
                match run.await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("Phrase job for material {} died: {}", material_id, e);
                        pipeline.mark_failed(material_id).await;
                        MaterialStatus::Failed
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Number of jobs still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels every outstanding job and waits until each has written its
    /// terminal status.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Phrase jobs drained.");
    }
}
