//! SQLite score store
//!
//! Writes go through the store's [`RetryPolicy`]; only lock contention is
//! retried. Upserts name the tables' uniqueness constraints as their conflict
//! targets, so a schema without them fails loudly instead of inserting
//! duplicates.

use async_trait::async_trait;
use bnews_common::db::RetryPolicy;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{CompositeStore, ScoreStore};
use crate::error::ScoreError;
use crate::models::{CompositeRecord, Perspective, PerspectiveScore, ScoreSource};

/// Score store backed by the `perspective_scores` and `composite_scores` tables
#[derive(Clone)]
pub struct SqliteScoreStore {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SqliteScoreStore {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// SQLite turns NaN into NULL; bind non-finite values as NULL explicitly
fn finite_or_null(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ScoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| ScoreError::PersistentStore(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn perspective_score_from_row(row: &SqliteRow) -> Result<PerspectiveScore, ScoreError> {
    let perspective: String = row.try_get("perspective").map_err(store_err)?;
    let score: Option<f64> = row.try_get("score").map_err(store_err)?;
    let confidence: Option<f64> = row.try_get("confidence").map_err(store_err)?;
    let created_at: String = row.try_get("created_at").map_err(store_err)?;

    Ok(PerspectiveScore {
        model: row.try_get("model").map_err(store_err)?,
        perspective: perspective.parse().unwrap_or(Perspective::Other),
        score: score.unwrap_or(f64::NAN),
        confidence: confidence.unwrap_or(0.0),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn store_err(err: sqlx::Error) -> ScoreError {
    ScoreError::from_sqlx("decode row", err)
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn fetch_scores(&self, document_id: i64) -> Result<Vec<PerspectiveScore>, ScoreError> {
        let pool = &self.pool;
        let rows = self
            .retry
            .run("fetch_scores", || async move {
                sqlx::query(
                    r#"
                    SELECT model, perspective, score, confidence, created_at
                    FROM perspective_scores
                    WHERE document_id = ?
                    ORDER BY model
                    "#,
                )
                .bind(document_id)
                .fetch_all(pool)
                .await
            })
            .await?;

        rows.iter().map(perspective_score_from_row).collect()
    }

    async fn upsert_score(
        &self,
        document_id: i64,
        score: &PerspectiveScore,
    ) -> Result<(), ScoreError> {
        let pool = &self.pool;
        let perspective = score.perspective.as_str();
        let value = finite_or_null(score.score);
        let confidence = finite_or_null(score.confidence);
        let created_at = score.created_at.to_rfc3339();

        let result = self
            .retry
            .run("upsert_score", || {
                let created_at = created_at.clone();
                async move {
                    sqlx::query(
                        r#"
                        INSERT INTO perspective_scores
                            (document_id, model, perspective, score, confidence, created_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(document_id, model) DO UPDATE SET
                            perspective = excluded.perspective,
                            score = excluded.score,
                            confidence = excluded.confidence,
                            created_at = excluded.created_at
                        "#,
                    )
                    .bind(document_id)
                    .bind(&score.model)
                    .bind(perspective)
                    .bind(value)
                    .bind(confidence)
                    .bind(created_at)
                    .execute(pool)
                    .await
                }
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScoreError::PersistentStore(format!(
                "upsert_score wrote no row for document {} model '{}'",
                document_id, score.model
            )));
        }
        Ok(())
    }

    async fn delete_scores(&self, document_id: i64) -> Result<u64, ScoreError> {
        let pool = &self.pool;
        let result = self
            .retry
            .run("delete_scores", || async move {
                sqlx::query("DELETE FROM perspective_scores WHERE document_id = ?")
                    .bind(document_id)
                    .execute(pool)
                    .await
            })
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_scores(
        &self,
        document_id: i64,
        scores: &[PerspectiveScore],
    ) -> Result<(), ScoreError> {
        // Bind values prepared outside the transaction
        let rows: Vec<(&str, &str, Option<f64>, Option<f64>, String)> = scores
            .iter()
            .map(|s| {
                (
                    s.model.as_str(),
                    s.perspective.as_str(),
                    finite_or_null(s.score),
                    finite_or_null(s.confidence),
                    s.created_at.to_rfc3339(),
                )
            })
            .collect();
        let pool = &self.pool;
        let rows = &rows;

        self.retry
            .run("replace_scores", || async move {
                let mut tx = pool.begin().await?;

                sqlx::query("DELETE FROM perspective_scores WHERE document_id = ?")
                    .bind(document_id)
                    .execute(&mut *tx)
                    .await?;

                for (model, perspective, score, confidence, created_at) in rows {
                    sqlx::query(
                        r#"
                        INSERT INTO perspective_scores
                            (document_id, model, perspective, score, confidence, created_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(document_id, model) DO UPDATE SET
                            perspective = excluded.perspective,
                            score = excluded.score,
                            confidence = excluded.confidence,
                            created_at = excluded.created_at
                        "#,
                    )
                    .bind(document_id)
                    .bind(*model)
                    .bind(*perspective)
                    .bind(*score)
                    .bind(*confidence)
                    .bind(created_at.as_str())
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await
            })
            .await?;

        tracing::debug!(
            doc_id = document_id,
            scores = scores.len(),
            "Raw scores replaced"
        );
        Ok(())
    }
}

#[async_trait]
impl CompositeStore for SqliteScoreStore {
    async fn upsert_composite(
        &self,
        document_id: i64,
        score: f64,
        confidence: f64,
        source: ScoreSource,
    ) -> Result<(), ScoreError> {
        let pool = &self.pool;
        let updated_at = Utc::now().to_rfc3339();
        let updated_at = updated_at.as_str();

        let result = self
            .retry
            .run("upsert_composite", || async move {
                sqlx::query(
                    r#"
                    INSERT INTO composite_scores (document_id, score, confidence, source, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(document_id) DO UPDATE SET
                        score = excluded.score,
                        confidence = excluded.confidence,
                        source = excluded.source,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(document_id)
                .bind(score)
                .bind(confidence)
                .bind(source.as_str())
                .bind(updated_at)
                .execute(pool)
                .await
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScoreError::PersistentStore(format!(
                "upsert_composite wrote no row for document {}",
                document_id
            )));
        }

        tracing::debug!(
            doc_id = document_id,
            score,
            confidence,
            source = source.as_str(),
            "Composite score persisted"
        );
        Ok(())
    }

    async fn fetch_composite(
        &self,
        document_id: i64,
    ) -> Result<Option<CompositeRecord>, ScoreError> {
        let pool = &self.pool;
        let row = self
            .retry
            .run("fetch_composite", || async move {
                sqlx::query(
                    r#"
                    SELECT document_id, score, confidence, source, updated_at
                    FROM composite_scores
                    WHERE document_id = ?
                    "#,
                )
                .bind(document_id)
                .fetch_optional(pool)
                .await
            })
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let source: String = row.try_get("source").map_err(store_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(store_err)?;

        Ok(Some(CompositeRecord {
            document_id: row.try_get("document_id").map_err(store_err)?,
            score: row.try_get("score").map_err(store_err)?,
            confidence: row.try_get("confidence").map_err(store_err)?,
            source: source.parse().map_err(ScoreError::PersistentStore)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }
}
