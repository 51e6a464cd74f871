//! bnews-scoring library interface
//!
//! Composite bias scoring core: turns per-model perspective scores into one
//! composite score with a confidence value, tracks job progress, and sweeps
//! the model ensemble for a working endpoint before a full run.

pub mod api;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::bootstrap::{load_composite_config, ScoringRuntime};
pub use crate::error::ScoreError;
