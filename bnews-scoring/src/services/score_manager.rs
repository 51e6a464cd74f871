//! Score Manager
//!
//! Orchestrates one composite score update:
//! fetch raw scores → calculate → persist → invalidate cache, reporting each
//! step to the [`ProgressManager`].
//!
//! A composite is written only when the calculator succeeds. Calculator and
//! store errors end the job in the Error step and are returned unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::progress_manager::{JobProgress, ProgressManager};
use super::score_cache::ScoreCache;
use super::score_calculator::ScoreCalculator;
use crate::db::{CompositeStore, ScoreStore};
use crate::error::ScoreError;
use crate::models::{is_valid_score, CompositeRecord, CompositeScoreConfig, ScoreResult, ScoreSource};

/// Confidence recorded for operator overrides
pub const MANUAL_CONFIDENCE: f64 = 1.0;

pub struct ScoreManager {
    scores: Arc<dyn ScoreStore>,
    composites: Arc<dyn CompositeStore>,
    calculator: Arc<dyn ScoreCalculator>,
    config: Arc<CompositeScoreConfig>,
    progress: Arc<ProgressManager>,
    cache: ScoreCache,
}

impl ScoreManager {
    pub fn new(
        scores: Arc<dyn ScoreStore>,
        composites: Arc<dyn CompositeStore>,
        calculator: Arc<dyn ScoreCalculator>,
        config: Arc<CompositeScoreConfig>,
        progress: Arc<ProgressManager>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            scores,
            composites,
            calculator,
            config,
            progress,
            cache: ScoreCache::new(cache_ttl),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressManager> {
        &self.progress
    }

    pub fn config(&self) -> &Arc<CompositeScoreConfig> {
        &self.config
    }

    pub fn score_store(&self) -> &Arc<dyn ScoreStore> {
        &self.scores
    }

    /// Recalculate and persist the composite score of a document
    ///
    /// Starts a new progress job for the document.
    pub async fn update_score(&self, document_id: i64) -> Result<ScoreResult, ScoreError> {
        let job = self.progress.begin_job(document_id);
        self.update_score_for_job(&job).await
    }

    /// Run the update as part of an already accepted job
    pub async fn update_score_for_job(&self, job: &JobProgress) -> Result<ScoreResult, ScoreError> {
        let document_id = job.document_id();
        let start = Instant::now();

        match self.calculate_and_persist(job).await {
            Ok(result) => {
                job.complete(&result);
                info!(
                    doc_id = document_id,
                    composite = result.composite_score,
                    confidence = result.confidence,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Composite score updated"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(doc_id = document_id, error = %err, "Composite score update failed");
                job.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn calculate_and_persist(&self, job: &JobProgress) -> Result<ScoreResult, ScoreError> {
        let document_id = job.document_id();

        job.in_progress(60, "Fetching perspective scores");
        let raw = self.scores.fetch_scores(document_id).await?;
        debug!(doc_id = document_id, entries = raw.len(), "Perspective scores fetched");

        job.in_progress(75, "Calculating composite score");
        let result = self.calculator.calculate(&raw, &self.config)?;

        job.in_progress(90, "Saving composite score");
        self.composites
            .upsert_composite(
                document_id,
                result.composite_score,
                result.confidence,
                ScoreSource::Llm,
            )
            .await?;
        self.cache.invalidate(document_id);

        Ok(result)
    }

    /// Persist an operator-supplied composite score
    pub async fn set_manual_score(&self, document_id: i64, score: f64) -> Result<(), ScoreError> {
        if !is_valid_score(score, self.config.min_score, self.config.max_score) {
            return Err(ScoreError::InvalidInput(format!(
                "score {} outside [{}, {}]",
                score, self.config.min_score, self.config.max_score
            )));
        }

        self.composites
            .upsert_composite(document_id, score, MANUAL_CONFIDENCE, ScoreSource::Manual)
            .await?;
        self.cache.invalidate(document_id);

        info!(doc_id = document_id, score, "Manual composite score set");
        Ok(())
    }

    /// Composite score of a document, served from cache when fresh
    ///
    /// A value read while a write invalidates the document is returned but
    /// not cached.
    pub async fn get_composite(&self, document_id: i64) -> Result<Option<CompositeRecord>, ScoreError> {
        if let Some(record) = self.cache.get(document_id) {
            return Ok(Some(record));
        }

        let ticket = self.cache.ticket();
        let record = self.composites.fetch_composite(document_id).await?;
        if let Some(record) = &record {
            self.cache.fill(ticket, record.clone());
        }
        Ok(record)
    }

    pub fn invalidate(&self, document_id: i64) {
        self.cache.invalidate(document_id);
    }
}
