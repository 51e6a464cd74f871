//! Integration tests for database initialization
//!
//! Covers automatic creation, WAL mode, busy timeout and the uniqueness
//! constraints the scoring upserts rely on.

use bnews_common::config::DatabaseConfig;
use bnews_common::db::init::init_database;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("bnews.db");

    let result = init_database(&db_path, &DatabaseConfig::default()).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bnews.db");

    let pool1 = init_database(&db_path, &DatabaseConfig::default()).await;
    assert!(pool1.is_ok());

    let pool2 = init_database(&db_path, &DatabaseConfig::default()).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bnews.db");
    let pool = init_database(&db_path, &DatabaseConfig::default()).await.unwrap();

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_busy_timeout_applied() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bnews.db");
    let config = DatabaseConfig {
        busy_timeout_ms: 1234,
        max_connections: 2,
    };
    let pool = init_database(&db_path, &config).await.unwrap();

    let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(timeout, 1234);
}

#[tokio::test]
async fn test_perspective_scores_unique_per_document_model() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bnews.db");
    let pool = init_database(&db_path, &DatabaseConfig::default()).await.unwrap();

    let insert = "INSERT INTO perspective_scores (document_id, model, perspective, score, confidence) \
                  VALUES (1, 'model-a', 'left', 0.1, 0.9)";
    sqlx::query(insert).execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).execute(&pool).await;

    assert!(duplicate.is_err(), "Duplicate (document_id, model) must be rejected");
}

#[tokio::test]
async fn test_composite_scores_keyed_by_document() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bnews.db");
    let pool = init_database(&db_path, &DatabaseConfig::default()).await.unwrap();

    sqlx::query(
        "INSERT INTO composite_scores (document_id, score, confidence, source) VALUES (9, 0.2, 0.5, 'llm') \
         ON CONFLICT(document_id) DO UPDATE SET score = excluded.score",
    )
    .execute(&pool)
    .await
    .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM composite_scores")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
