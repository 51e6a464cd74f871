//! Database initialization
//!
//! Opens (or creates) the SQLite database with the concurrency settings the
//! scoring core depends on:
//! - WAL journal mode so readers proceed while a writer holds its transaction
//! - busy_timeout so contending writers wait briefly instead of failing at once
//! - foreign keys enabled
//!
//! Pragmas are set through `SqliteConnectOptions` so that every pooled
//! connection carries them, not only the first one.

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Idempotent - safe to call on every startup
    create_perspective_scores_table(&pool).await?;
    create_composite_scores_table(&pool).await?;

    info!(
        busy_timeout_ms = config.busy_timeout_ms,
        max_connections = config.max_connections,
        "Database ready (WAL mode)"
    );

    Ok(pool)
}

/// Raw per-model scores, one row per (document, model)
///
/// The UNIQUE constraint is the conflict target of the raw-score upsert.
/// SQLite stores NaN as NULL, so `score` and `confidence` are nullable.
pub async fn create_perspective_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS perspective_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            model TEXT NOT NULL,
            perspective TEXT NOT NULL,
            score REAL,
            confidence REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (document_id, model)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_perspective_scores_document ON perspective_scores(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Composite score per document
///
/// `document_id` is the primary key and therefore the conflict target of the
/// composite upsert.
pub async fn create_composite_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS composite_scores (
            document_id INTEGER PRIMARY KEY,
            score REAL NOT NULL,
            confidence REAL NOT NULL,
            source TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
