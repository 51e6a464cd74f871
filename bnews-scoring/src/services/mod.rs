//! Scoring services

pub mod health_check;
pub mod mock_client;
pub mod progress_manager;
pub mod reanalyzer;
pub mod score_cache;
pub mod score_calculator;
pub mod score_manager;
pub mod scoring_client;

pub use health_check::HealthCheckOrchestrator;
pub use mock_client::MockScoringClient;
pub use progress_manager::{JobProgress, ProgressManager};
pub use reanalyzer::{ReanalysisTicket, Reanalyzer};
pub use score_cache::{FillTicket, ScoreCache};
pub use score_calculator::{DefaultScoreCalculator, ScoreCalculator};
pub use score_manager::ScoreManager;
pub use scoring_client::{
    FailureKind, HttpScoringClient, ModelScore, ScoringClient, ScoringFailure,
};
