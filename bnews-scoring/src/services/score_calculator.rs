//! Composite Score Calculator
//!
//! Combines per-model perspective scores into one composite score and a
//! confidence value.
//!
//! **Pipeline:**
//! 1. Resolve each model to its configured perspective (unknown models skipped)
//! 2. Validate each score against `[min_score, max_score]`; `ignore` drops
//!    invalid entries, `default` substitutes `default_missing`
//! 3. Average models within a perspective
//! 4. Combine perspectives (`average` or `weighted`), clamp to range
//! 5. Derive confidence per `confidence_method`, then bound it to
//!    `[min_confidence, max_confidence]` when a configured perspective is missing
//!
//! When no perspective survives step 2, or every model reported zero
//! confidence, the result is `ScoreError::AllPerspectivesInvalid`; there is no
//! neutral fallback value.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::ScoreError;
use crate::models::{
    is_valid_score, CompositeScoreConfig, ConfidenceMethod, Formula, InvalidHandling,
    Perspective, PerspectiveScore, ScoreResult,
};

/// Composite score calculation seam
pub trait ScoreCalculator: Send + Sync {
    /// Calculate the composite score for one document's raw scores
    fn calculate(
        &self,
        scores: &[PerspectiveScore],
        config: &CompositeScoreConfig,
    ) -> Result<ScoreResult, ScoreError>;
}

/// Standard calculator
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultScoreCalculator;

/// Aggregated values for one perspective
#[derive(Debug, Clone, Copy, PartialEq)]
struct PerspectiveValue {
    score: f64,
    confidence: f64,
}

impl DefaultScoreCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Apply validity rules and average models within each perspective
    fn collect_perspectives(
        scores: &[PerspectiveScore],
        config: &CompositeScoreConfig,
    ) -> BTreeMap<Perspective, PerspectiveValue> {
        // (score sum, confidence sum, count)
        let mut sums: BTreeMap<Perspective, (f64, f64, usize)> = BTreeMap::new();

        for entry in scores {
            let Some(perspective) = config.perspective_for_model(&entry.model) else {
                warn!(model = %entry.model, "Model not in composite config, skipping score");
                continue;
            };

            let value = if entry.is_valid(config.min_score, config.max_score) {
                entry.score
            } else {
                match config.handle_invalid {
                    InvalidHandling::Ignore => {
                        debug!(
                            model = %entry.model,
                            score = entry.score,
                            "Ignoring invalid score"
                        );
                        continue;
                    }
                    InvalidHandling::Default => {
                        debug!(
                            model = %entry.model,
                            score = entry.score,
                            default = config.default_missing,
                            "Replacing invalid score with default"
                        );
                        config.default_missing
                    }
                }
            };

            let slot = sums.entry(perspective).or_insert((0.0, 0.0, 0));
            slot.0 += value;
            slot.1 += sanitize_confidence(entry.confidence);
            slot.2 += 1;
        }

        sums.into_iter()
            .map(|(perspective, (score_sum, conf_sum, count))| {
                let n = count as f64;
                let value = PerspectiveValue {
                    score: score_sum / n,
                    confidence: conf_sum / n,
                };
                debug!(
                    perspective = %perspective,
                    models = count,
                    score = value.score,
                    confidence = value.confidence,
                    "Perspective aggregated"
                );
                (perspective, value)
            })
            .collect()
    }

    fn composite(
        perspectives: &BTreeMap<Perspective, PerspectiveValue>,
        config: &CompositeScoreConfig,
    ) -> f64 {
        let average = || {
            perspectives.values().map(|v| v.score).sum::<f64>() / perspectives.len() as f64
        };

        let raw = match config.formula {
            Formula::Average => average(),
            Formula::Weighted => {
                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;
                for (perspective, value) in perspectives {
                    let weight = config.weight_for(*perspective);
                    weighted_sum += value.score * weight;
                    weight_total += weight;
                }
                if weight_total > 0.0 {
                    weighted_sum / weight_total
                } else {
                    debug!("Present perspective weights sum to zero, using plain average");
                    average()
                }
            }
        };

        raw.clamp(config.min_score, config.max_score)
    }

    fn confidence(
        perspectives: &BTreeMap<Perspective, PerspectiveValue>,
        config: &CompositeScoreConfig,
    ) -> f64 {
        let confidences = perspectives.values().map(|v| v.confidence);
        let present = perspectives.len();

        let value = match config.confidence_method {
            ConfidenceMethod::Average => confidences.sum::<f64>() / present as f64,
            ConfidenceMethod::Min => confidences.fold(f64::INFINITY, f64::min),
            ConfidenceMethod::Max => confidences.fold(f64::NEG_INFINITY, f64::max),
            ConfidenceMethod::SpreadBased => {
                if present >= config.confidence_params.min_count {
                    let scores: Vec<f64> = perspectives.values().map(|v| v.score).collect();
                    let half_range = (config.max_score - config.min_score) / 2.0;
                    1.0 - population_std_dev(&scores) / half_range
                } else {
                    config.confidence_params.insufficient_confidence
                }
            }
            ConfidenceMethod::CountValid => {
                let configured = config.configured_perspectives().len().max(1);
                present as f64 / configured as f64
            }
        };

        let value = sanitize_confidence(value);
        let configured = config.configured_perspectives().len();
        if present < configured && config.max_confidence > config.min_confidence {
            value.clamp(config.min_confidence, config.max_confidence)
        } else {
            value
        }
    }
}

impl ScoreCalculator for DefaultScoreCalculator {
    fn calculate(
        &self,
        scores: &[PerspectiveScore],
        config: &CompositeScoreConfig,
    ) -> Result<ScoreResult, ScoreError> {
        config.validate()?;

        if !scores.is_empty() && scores.iter().all(|s| sanitize_confidence(s.confidence) == 0.0) {
            warn!(
                entries = scores.len(),
                "Every model reported zero confidence, composite cannot be derived"
            );
            return Err(ScoreError::AllPerspectivesInvalid);
        }

        let perspectives = Self::collect_perspectives(scores, config);
        if perspectives.is_empty() {
            warn!(
                entries = scores.len(),
                "No valid perspective scores, composite cannot be derived"
            );
            return Err(ScoreError::AllPerspectivesInvalid);
        }

        let result = ScoreResult {
            composite_score: Self::composite(&perspectives, config),
            confidence: Self::confidence(&perspectives, config),
        };

        debug!(
            perspectives = perspectives.len(),
            composite = result.composite_score,
            confidence = result.confidence,
            "Composite score calculated"
        );

        Ok(result)
    }
}

/// Clamp to [0, 1]; non-finite values count as no confidence
fn sanitize_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
