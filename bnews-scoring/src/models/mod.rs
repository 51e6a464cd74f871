//! Data models for bnews-scoring

pub mod composite_config;
pub mod perspective;
pub mod progress;

pub use composite_config::{
    CompositeScoreConfig, ConfidenceMethod, ConfidenceParams, Formula, InvalidHandling,
    ModelConfig,
};
pub use perspective::{
    is_valid_score, CompositeRecord, Perspective, PerspectiveScore, ScoreResult, ScoreSource,
};
pub use progress::{ProgressState, ProgressStep};
