//! Runtime assembly
//!
//! Wires the database, scoring client, progress manager and score manager
//! from the bootstrap TOML config and the composite score JSON config.

use bnews_common::config::TomlConfig;
use bnews_common::db::{init_database, RetryPolicy};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::db::SqliteScoreStore;
use crate::error::ScoreError;
use crate::models::CompositeScoreConfig;
use crate::services::{
    DefaultScoreCalculator, HealthCheckOrchestrator, HttpScoringClient, ProgressManager,
    Reanalyzer, ScoreManager, ScoringClient,
};

/// Read and validate the composite score JSON config
pub fn load_composite_config(path: &Path) -> Result<CompositeScoreConfig, ScoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ScoreError::Validation(format!(
            "Failed to read composite config {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: CompositeScoreConfig = serde_json::from_str(&content).map_err(|e| {
        ScoreError::Validation(format!(
            "Failed to parse composite config {}: {}",
            path.display(),
            e
        ))
    })?;
    config.validate()?;
    Ok(config)
}

/// Assembled scoring services
pub struct ScoringRuntime {
    pub pool: SqlitePool,
    pub store: Arc<SqliteScoreStore>,
    pub client: Arc<dyn ScoringClient>,
    pub progress: Arc<ProgressManager>,
    pub manager: Arc<ScoreManager>,
    pub reanalyzer: Reanalyzer,
    cleanup_task: JoinHandle<()>,
}

impl ScoringRuntime {
    /// Build the runtime with the HTTP scoring client
    pub async fn build(config: &TomlConfig) -> Result<Self, ScoreError> {
        let client = HttpScoringClient::new(
            config.scoring.base_url.clone(),
            config.scoring.main_timeout(),
        )
        .map_err(|e| ScoreError::Internal(e.to_string()))?;
        let composite = load_composite_config(&config.composite_config_path)?;

        Self::build_with(config, composite, Arc::new(client)).await
    }

    /// Build the runtime around an explicit composite config and client
    pub async fn build_with(
        config: &TomlConfig,
        composite: CompositeScoreConfig,
        client: Arc<dyn ScoringClient>,
    ) -> Result<Self, ScoreError> {
        config.validate()?;
        composite.validate()?;

        let pool = init_database(&config.database_path, &config.database).await?;
        let store = Arc::new(SqliteScoreStore::new(
            pool.clone(),
            RetryPolicy::from(&config.retry),
        ));

        let progress = Arc::new(ProgressManager::new(
            config.progress.cleanup_interval(),
            config.progress.terminal_ttl(),
            config.progress.stale_ttl(),
        ));
        let cleanup_task = progress.spawn_cleanup_task();

        let manager = Arc::new(ScoreManager::new(
            store.clone(),
            store.clone(),
            Arc::new(DefaultScoreCalculator::new()),
            Arc::new(composite),
            progress.clone(),
            config.cache.ttl(),
        ));

        let health = HealthCheckOrchestrator::new(
            client.clone(),
            config.scoring.health_check_timeout(),
        );
        let reanalyzer = Reanalyzer::new(client.clone(), health, manager.clone());

        info!(
            database = %config.database_path.display(),
            models = manager.config().models.len(),
            "Scoring runtime ready"
        );

        Ok(Self {
            pool,
            store,
            client,
            progress,
            manager,
            reanalyzer,
            cleanup_task,
        })
    }

    /// Stop background tasks and close the pool
    pub async fn shutdown(self) {
        self.progress.shutdown();
        if let Err(e) = self.cleanup_task.await {
            tracing::warn!(error = %e, "Progress cleanup task ended abnormally");
        }
        self.pool.close().await;
        info!("Scoring runtime stopped");
    }
}
