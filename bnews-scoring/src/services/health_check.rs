//! Model health-check sweep
//!
//! Before an ensemble run is queued, the configured models are tried in order
//! with a short timeout until one answers. Every failure class continues the
//! sweep; only when all models fail is the run refused.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::scoring_client::ScoringClient;
use crate::error::ScoreError;
use crate::models::CompositeScoreConfig;

/// Content sent with each trial call
pub const DEFAULT_PROBE_CONTENT: &str = "Health check probe.";

/// Pre-flight model sweep
pub struct HealthCheckOrchestrator {
    client: Arc<dyn ScoringClient>,
    trial_timeout: Duration,
    probe_content: String,
}

impl HealthCheckOrchestrator {
    pub fn new(client: Arc<dyn ScoringClient>, trial_timeout: Duration) -> Self {
        Self {
            client,
            trial_timeout,
            probe_content: DEFAULT_PROBE_CONTENT.to_string(),
        }
    }

    pub fn with_probe_content(mut self, content: impl Into<String>) -> Self {
        self.probe_content = content.into();
        self
    }

    pub fn trial_timeout(&self) -> Duration {
        self.trial_timeout
    }

    /// Return the name of the first model that answers a trial call
    ///
    /// Each trial call carries the trial timeout; the client's main timeout is
    /// never changed, so concurrent sweeps and running jobs do not interfere.
    pub async fn find_working_model(
        &self,
        config: &CompositeScoreConfig,
    ) -> Result<String, ScoreError> {
        let start = Instant::now();
        let mut last_error: Option<ScoreError> = None;

        for (index, model) in config.models.iter().enumerate() {
            match self
                .client
                .score_with_timeout(&self.probe_content, model, self.trial_timeout)
                .await
            {
                Ok(_) => {
                    info!(
                        model = %model.name,
                        attempts = index + 1,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Health check found working model"
                    );
                    return Ok(model.name.clone());
                }
                Err(failure) => {
                    warn!(
                        model = %model.name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Health check failed, trying next model"
                    );
                    last_error = Some(ScoreError::ModelUnavailable {
                        model: model.name.clone(),
                        kind: failure.kind,
                        message: failure.message,
                    });
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| ScoreError::Validation("no models configured".to_string()));
        warn!(
            models = config.models.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Health check: no working model"
        );
        Err(ScoreError::all_models_unavailable(last))
    }
}
