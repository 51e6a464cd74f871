//! Composite score configuration
//!
//! Deserialized from the composite score JSON document. The core receives it
//! pre-parsed; `validate()` rejects malformed values before any scoring run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::perspective::Perspective;
use crate::error::ScoreError;

/// How per-perspective values combine into the composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formula {
    #[default]
    Average,
    Weighted,
}

/// What to do with NaN, infinite, or out-of-range model scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidHandling {
    /// Drop the entry entirely
    #[default]
    Ignore,
    /// Replace the value with `default_missing` and keep it
    Default,
}

/// Confidence aggregation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMethod {
    #[default]
    Average,
    Min,
    Max,
    #[serde(alias = "spread")]
    SpreadBased,
    /// Present perspectives divided by configured perspectives
    CountValid,
}

/// Tunables for confidence methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceParams {
    /// Perspectives required before `spread_based` trusts the spread
    #[serde(default = "default_min_count")]
    pub min_count: usize,

    /// Confidence reported by `spread_based` when `min_count` is not met
    #[serde(default = "default_insufficient_confidence")]
    pub insufficient_confidence: f64,
}

fn default_min_count() -> usize {
    2
}

fn default_insufficient_confidence() -> f64 {
    0.1
}

impl Default for ConfidenceParams {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            insufficient_confidence: default_insufficient_confidence(),
        }
    }
}

/// One model of the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "modelName", alias = "name")]
    pub name: String,

    pub perspective: Perspective,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Per-model endpoint; the client's base url is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Composite score configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScoreConfig {
    /// Ordered model list; order is the health-check sweep order
    pub models: Vec<ModelConfig>,

    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_max_score")]
    pub max_score: f64,

    #[serde(default)]
    pub default_missing: f64,

    #[serde(default)]
    pub handle_invalid: InvalidHandling,

    #[serde(default)]
    pub formula: Formula,

    /// Perspective weights for the `weighted` formula
    #[serde(default)]
    pub weights: BTreeMap<Perspective, f64>,

    #[serde(default)]
    pub confidence_method: ConfidenceMethod,

    #[serde(default)]
    pub confidence_params: ConfidenceParams,

    /// Lower confidence bound applied when some configured perspective is missing
    #[serde(default)]
    pub min_confidence: f64,

    /// Upper confidence bound applied when some configured perspective is missing
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,
}

fn default_max_confidence() -> f64 {
    1.0
}

fn default_min_score() -> f64 {
    -1.0
}

fn default_max_score() -> f64 {
    1.0
}

impl CompositeScoreConfig {
    /// Reject configurations the calculator cannot interpret
    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.models.is_empty() {
            return Err(ScoreError::Validation("models list is empty".to_string()));
        }
        if !self.min_score.is_finite() || !self.max_score.is_finite() {
            return Err(ScoreError::Validation(
                "min_score and max_score must be finite".to_string(),
            ));
        }
        if self.min_score >= self.max_score {
            return Err(ScoreError::Validation(format!(
                "min_score ({}) must be less than max_score ({})",
                self.min_score, self.max_score
            )));
        }
        if !self.default_missing.is_finite()
            || self.default_missing < self.min_score
            || self.default_missing > self.max_score
        {
            return Err(ScoreError::Validation(format!(
                "default_missing ({}) must lie within [{}, {}]",
                self.default_missing, self.min_score, self.max_score
            )));
        }
        for (perspective, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ScoreError::Validation(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    perspective, weight
                )));
            }
        }
        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(ScoreError::Validation("model name must not be empty".to_string()));
            }
            if let Some(weight) = model.weight {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(ScoreError::Validation(format!(
                        "weight for model '{}' must be a non-negative number, got {}",
                        model.name, weight
                    )));
                }
            }
        }
        if self.confidence_params.min_count == 0 {
            return Err(ScoreError::Validation(
                "confidence_params.min_count must be at least 1".to_string(),
            ));
        }
        let fallback = self.confidence_params.insufficient_confidence;
        if !(0.0..=1.0).contains(&fallback) {
            return Err(ScoreError::Validation(format!(
                "confidence_params.insufficient_confidence ({}) must lie within [0, 1]",
                fallback
            )));
        }
        for (name, bound) in [
            ("min_confidence", self.min_confidence),
            ("max_confidence", self.max_confidence),
        ] {
            if !(0.0..=1.0).contains(&bound) {
                return Err(ScoreError::Validation(format!(
                    "{} ({}) must lie within [0, 1]",
                    name, bound
                )));
            }
        }
        if self.min_confidence > self.max_confidence {
            return Err(ScoreError::Validation(format!(
                "min_confidence ({}) must not exceed max_confidence ({})",
                self.min_confidence, self.max_confidence
            )));
        }
        Ok(())
    }

    /// Resolve the perspective of a stored model name
    ///
    /// Names are compared trimmed, lowercased and without a `:tag` suffix.
    /// Exact matches win over prefix matches; bare legacy names
    /// (`left`, `center`, `neutral`, `right`) are accepted last.
    pub fn perspective_for_model(&self, model_name: &str) -> Option<Perspective> {
        let wanted = normalize_model_name(model_name);
        if wanted.is_empty() {
            return None;
        }

        let normalized: Vec<(String, Perspective)> = self
            .models
            .iter()
            .map(|m| (normalize_model_name(&m.name), m.perspective))
            .collect();

        if let Some((_, p)) = normalized.iter().find(|(name, _)| *name == wanted) {
            return Some(*p);
        }
        if let Some((_, p)) = normalized
            .iter()
            .find(|(name, _)| !name.is_empty() && wanted.starts_with(name.as_str()))
        {
            return Some(*p);
        }
        Perspective::from_legacy_name(&wanted)
    }

    /// Weight of a perspective under the `weighted` formula
    ///
    /// Explicit perspective weights win; otherwise the mean of the weights of
    /// the models assigned to it; otherwise 1.0.
    pub fn weight_for(&self, perspective: Perspective) -> f64 {
        if let Some(weight) = self.weights.get(&perspective) {
            return *weight;
        }
        let model_weights: Vec<f64> = self
            .models
            .iter()
            .filter(|m| m.perspective == perspective)
            .filter_map(|m| m.weight)
            .collect();
        if model_weights.is_empty() {
            1.0
        } else {
            model_weights.iter().sum::<f64>() / model_weights.len() as f64
        }
    }

    /// Distinct perspectives covered by the model list
    pub fn configured_perspectives(&self) -> BTreeSet<Perspective> {
        self.models.iter().map(|m| m.perspective).collect()
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }
}

fn normalize_model_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.find(':') {
        Some(idx) => lowered[..idx].to_string(),
        None => lowered,
    }
}
