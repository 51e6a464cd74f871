//! Scoring job progress state machine
//!
//! A job moves Queued → InProgress → {Complete | Error}. Terminal states are
//! never left; a newer job for the same document starts a new generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    /// Accepted, not started
    Queued,
    /// Scoring or persistence underway
    InProgress,
    /// Composite score persisted
    Complete,
    /// Job failed; see `error`
    Error,
}

impl ProgressStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStep::Complete | ProgressStep::Error)
    }

    /// Ordering used to refuse backwards transitions
    pub fn rank(&self) -> u8 {
        match self {
            ProgressStep::Queued => 0,
            ProgressStep::InProgress => 1,
            ProgressStep::Complete | ProgressStep::Error => 2,
        }
    }

    /// Whether `next` may follow `self` within one job
    pub fn can_advance_to(&self, next: ProgressStep) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressStep::Queued => "Queued",
            ProgressStep::InProgress => "InProgress",
            ProgressStep::Complete => "Complete",
            ProgressStep::Error => "Error",
        }
    }
}

/// Progress snapshot for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub document_id: i64,

    /// Job that produced this snapshot
    pub job_id: Uuid,

    /// Per-document job counter; higher generations supersede lower ones
    pub generation: u64,

    pub step: ProgressStep,

    /// Short status label ("Queued", "Scoring", "Success", "Error")
    pub status: String,

    /// Percentage complete (0 - 100)
    pub percent: u8,

    /// Current operation description
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_confidence: Option<f64>,

    pub last_updated: DateTime<Utc>,
}

impl ProgressState {
    /// Fresh Queued state for a newly accepted job
    pub fn queued(document_id: i64, job_id: Uuid, generation: u64) -> Self {
        Self {
            document_id,
            job_id,
            generation,
            step: ProgressStep::Queued,
            status: "Queued".to_string(),
            percent: 0,
            message: "Scoring job queued".to_string(),
            error: None,
            final_score: None,
            final_confidence: None,
            last_updated: Utc::now(),
        }
    }

    /// Copy of this state advanced to `step`
    pub fn advanced(&self, step: ProgressStep, percent: u8, message: impl Into<String>) -> Self {
        let status = match step {
            ProgressStep::Queued => "Queued",
            ProgressStep::InProgress => "Scoring",
            ProgressStep::Complete => "Success",
            ProgressStep::Error => "Error",
        };
        Self {
            step,
            status: status.to_string(),
            percent: percent.min(100),
            message: message.into(),
            last_updated: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }
}
