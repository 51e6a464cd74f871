//! Ensemble reanalysis
//!
//! **Flow:**
//! 1. Health-check sweep; if no model answers, nothing is queued
//! 2. Progress job queued, acknowledgment returned to the caller
//! 3. Background task scores the document with every configured model,
//!    continuing past any failure
//! 4. Successful raw scores replace the document's previous ones
//! 5. Composite recalculated through [`ScoreManager::update_score_for_job`]
//!
//! A panic inside the background task ends the job in the Error step. The
//! handle returned with the ticket resolves to the job's final outcome.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::health_check::HealthCheckOrchestrator;
use super::progress_manager::JobProgress;
use super::score_manager::ScoreManager;
use super::scoring_client::ScoringClient;
use crate::error::ScoreError;
use crate::models::{CompositeScoreConfig, PerspectiveScore, ScoreResult};

/// Acknowledgment of a queued reanalysis
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReanalysisTicket {
    pub document_id: i64,
    pub job_id: Uuid,
    pub generation: u64,
    /// Model that passed the health check
    pub working_model: String,
}

pub struct Reanalyzer {
    client: Arc<dyn ScoringClient>,
    health: HealthCheckOrchestrator,
    manager: Arc<ScoreManager>,
}

impl Reanalyzer {
    pub fn new(
        client: Arc<dyn ScoringClient>,
        health: HealthCheckOrchestrator,
        manager: Arc<ScoreManager>,
    ) -> Self {
        Self {
            client,
            health,
            manager,
        }
    }

    pub fn manager(&self) -> &Arc<ScoreManager> {
        &self.manager
    }

    /// Run the health-check sweep alone
    pub async fn health_check(&self) -> Result<String, ScoreError> {
        self.health.find_working_model(self.manager.config()).await
    }

    /// Queue a full ensemble rescoring of `content` for `document_id`
    ///
    /// Returns once the job is queued. The returned handle resolves to the
    /// job's outcome; a panicked or aborted task becomes `ScoreError::Internal`.
    pub async fn reanalyze(
        &self,
        document_id: i64,
        content: String,
    ) -> Result<(ReanalysisTicket, JoinHandle<Result<ScoreResult, ScoreError>>), ScoreError> {
        let config = Arc::clone(self.manager.config());

        let working_model = self.health.find_working_model(&config).await.map_err(|err| {
            warn!(doc_id = document_id, error = %err, "Reanalysis refused: no working model");
            err
        })?;

        let job = self.manager.progress().begin_job(document_id);
        let ticket = ReanalysisTicket {
            document_id,
            job_id: job.job_id(),
            generation: job.generation(),
            working_model,
        };

        info!(
            doc_id = document_id,
            job_id = %ticket.job_id,
            working_model = %ticket.working_model,
            "Reanalysis queued"
        );

        let worker = tokio::spawn(run_ensemble(
            Arc::clone(&self.client),
            Arc::clone(&self.manager),
            config,
            job.clone(),
            content,
        ));

        let handle = tokio::spawn(async move {
            match worker.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(
                        doc_id = job.document_id(),
                        error = %join_err,
                        "Reanalysis task aborted"
                    );
                    let err =
                        ScoreError::Internal(format!("reanalysis task aborted: {}", join_err));
                    job.fail(err.to_string());
                    Err(err)
                }
            }
        });

        Ok((ticket, handle))
    }
}

async fn run_ensemble(
    client: Arc<dyn ScoringClient>,
    manager: Arc<ScoreManager>,
    config: Arc<CompositeScoreConfig>,
    job: JobProgress,
    content: String,
) -> Result<ScoreResult, ScoreError> {
    let document_id = job.document_id();
    let total = config.models.len().max(1);
    let mut collected: Vec<PerspectiveScore> = Vec::with_capacity(total);
    let mut last_error: Option<ScoreError> = None;

    job.in_progress(5, format!("Scoring with {} models", total));

    for (index, model) in config.models.iter().enumerate() {
        match client.score(&content, model).await {
            Ok(answer) => {
                collected.push(PerspectiveScore::new(
                    model.name.clone(),
                    model.perspective,
                    answer.score,
                    answer.confidence,
                ));
            }
            Err(failure) => {
                warn!(
                    doc_id = document_id,
                    model = %model.name,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Model scoring failed, continuing with remaining models"
                );
                last_error = Some(ScoreError::ModelUnavailable {
                    model: model.name.clone(),
                    kind: failure.kind,
                    message: failure.message,
                });
            }
        }

        let percent = 5 + (45 * (index + 1) / total) as u8;
        job.in_progress(percent, format!("Scored {}/{} models", index + 1, total));
    }

    if collected.is_empty() {
        let last = last_error
            .unwrap_or_else(|| ScoreError::Validation("no models configured".to_string()));
        let err = ScoreError::all_models_unavailable(last);
        warn!(doc_id = document_id, error = %err, "Reanalysis failed");
        job.fail(err.to_string());
        return Err(err);
    }

    if let Err(err) = manager
        .score_store()
        .replace_scores(document_id, &collected)
        .await
    {
        warn!(doc_id = document_id, error = %err, "Failed to store raw scores");
        job.fail(err.to_string());
        return Err(err);
    }

    manager.update_score_for_job(&job).await
}
