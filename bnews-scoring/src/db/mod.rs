//! Persistence seams for raw and composite scores

pub mod scores;

use async_trait::async_trait;

use crate::error::ScoreError;
use crate::models::{CompositeRecord, PerspectiveScore, ScoreSource};

pub use scores::SqliteScoreStore;

/// Raw per-model score store, keyed uniquely by (document, model)
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn fetch_scores(&self, document_id: i64) -> Result<Vec<PerspectiveScore>, ScoreError>;

    async fn upsert_score(
        &self,
        document_id: i64,
        score: &PerspectiveScore,
    ) -> Result<(), ScoreError>;

    /// Remove every raw score of a document, returning how many were removed
    async fn delete_scores(&self, document_id: i64) -> Result<u64, ScoreError>;

    /// Replace a document's raw scores with `scores`
    ///
    /// The default implementation is not atomic; stores with transactions
    /// should override it.
    async fn replace_scores(
        &self,
        document_id: i64,
        scores: &[PerspectiveScore],
    ) -> Result<(), ScoreError> {
        self.delete_scores(document_id).await?;
        for score in scores {
            self.upsert_score(document_id, score).await?;
        }
        Ok(())
    }
}

/// Composite score persistence, keyed by document
#[async_trait]
pub trait CompositeStore: Send + Sync {
    async fn upsert_composite(
        &self,
        document_id: i64,
        score: f64,
        confidence: f64,
        source: ScoreSource,
    ) -> Result<(), ScoreError>;

    async fn fetch_composite(&self, document_id: i64)
        -> Result<Option<CompositeRecord>, ScoreError>;
}
