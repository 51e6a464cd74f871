//! Perspective scores and composite results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Political-leaning category a model is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    Left,
    #[serde(alias = "neutral")]
    Center,
    Right,
    Other,
}

impl Perspective {
    pub const ALL: [Perspective; 4] = [
        Perspective::Left,
        Perspective::Center,
        Perspective::Right,
        Perspective::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Perspective::Left => "left",
            Perspective::Center => "center",
            Perspective::Right => "right",
            Perspective::Other => "other",
        }
    }

    /// Map a bare legacy model name ("left", "neutral", ...) to its perspective
    pub fn from_legacy_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(Perspective::Left),
            "center" | "neutral" => Some(Perspective::Center),
            "right" => Some(Perspective::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Perspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Perspective::Left),
            "center" | "neutral" => Ok(Perspective::Center),
            "right" => Ok(Perspective::Right),
            "other" => Ok(Perspective::Other),
            other => Err(format!("unknown perspective '{}'", other)),
        }
    }
}

/// One model's raw score for one document
///
/// Validity is not stored: it is derived against the configured range with
/// [`PerspectiveScore::is_valid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveScore {
    pub model: String,
    pub perspective: Perspective,
    pub score: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl PerspectiveScore {
    pub fn new(
        model: impl Into<String>,
        perspective: Perspective,
        score: f64,
        confidence: f64,
    ) -> Self {
        Self {
            model: model.into(),
            perspective,
            score,
            confidence,
            created_at: Utc::now(),
        }
    }

    /// False for NaN, infinities, and values outside `[min, max]`
    pub fn is_valid(&self, min_score: f64, max_score: f64) -> bool {
        is_valid_score(self.score, min_score, max_score)
    }
}

/// Score validity rule shared by the calculator and manual overrides
pub fn is_valid_score(value: f64, min_score: f64, max_score: f64) -> bool {
    value.is_finite() && value >= min_score && value <= max_score
}

/// Successful composite calculation
///
/// Only ever produced on success; there is no placeholder instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub composite_score: f64,
    pub confidence: f64,
}

/// Origin of a persisted composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    /// Computed from the model ensemble
    Llm,
    /// Set by an operator override
    Manual,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Llm => "llm",
            ScoreSource::Manual => "manual",
        }
    }
}

impl FromStr for ScoreSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(ScoreSource::Llm),
            "manual" => Ok(ScoreSource::Manual),
            other => Err(format!("unknown score source '{}'", other)),
        }
    }
}

/// Persisted composite score row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRecord {
    pub document_id: i64,
    pub score: f64,
    pub confidence: f64,
    pub source: ScoreSource,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_rules() {
        assert!(is_valid_score(0.0, -1.0, 1.0));
        assert!(is_valid_score(-1.0, -1.0, 1.0));
        assert!(is_valid_score(1.0, -1.0, 1.0));
        assert!(!is_valid_score(1.01, -1.0, 1.0));
        assert!(!is_valid_score(f64::NAN, -1.0, 1.0));
        assert!(!is_valid_score(f64::INFINITY, -1.0, 1.0));
        assert!(!is_valid_score(f64::NEG_INFINITY, -1.0, 1.0));
    }

    #[test]
    fn test_perspective_parsing() {
        assert_eq!("Left".parse::<Perspective>().unwrap(), Perspective::Left);
        assert_eq!(" center ".parse::<Perspective>().unwrap(), Perspective::Center);
        assert!("centre-left".parse::<Perspective>().is_err());
        assert_eq!(Perspective::from_legacy_name("neutral"), Some(Perspective::Center));
        assert_eq!(Perspective::from_legacy_name("gpt-4"), None);
    }

    #[test]
    fn test_perspective_serde_lowercase() {
        let json = serde_json::to_string(&Perspective::Right).unwrap();
        assert_eq!(json, "\"right\"");
    }

    #[test]
    fn test_neutral_deserializes_as_center() {
        let p: Perspective = serde_json::from_str("\"neutral\"").unwrap();
        assert_eq!(p, Perspective::Center);
        assert_eq!("Neutral".parse::<Perspective>().unwrap(), Perspective::Center);
        // Always written back under the canonical name
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"center\"");
    }
}
