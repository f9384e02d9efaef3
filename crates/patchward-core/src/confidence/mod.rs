//! Confidence scoring from raw model signals and historical outcomes.
//!
//! Raw logits are normalized with a numerically stable softmax (maximum
//! subtracted before exponentiation) so extreme inputs cannot overflow, then
//! the peak weight is blended with a per-class historical success rate:
//!
//! ```text
//! confidence = w * model_signal + (1 - w) * historical_rate
//! ```
//!
//! where `w` is [`EngineConfig::blend_weight`]. The historical rate is an
//! exponential moving average updated only through
//! [`ConfidenceScorer::record_outcome`]; a rate supplied in the request's
//! historical-statistics mapping overrides the moving average for that call.
//!
//! An empty logits vector yields an uninformative model signal of
//! [`NEUTRAL_SIGNAL`] rather than dividing by zero.
//!
//! [`EngineConfig::blend_weight`]: crate::config::EngineConfig::blend_weight

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::breaker::ErrorClass;
use crate::config::EngineConfig;

/// Model signal used when no logits are supplied.
///
/// 0.5 is the uninformative midpoint: with no model evidence the blended
/// confidence degrades toward the historical rate alone.
pub const NEUTRAL_SIGNAL: f64 = 0.5;

/// Starting historical rate before any outcome has been recorded.
const NEUTRAL_RATE: f64 = 0.5;

/// Per-attempt confidence values, each in `[0, 1]`.
///
/// Ephemeral: derived per call and snapshotted into the envelope, never
/// stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// Confidence that a syntax-class patch will succeed.
    pub syntax_confidence: f64,
    /// Confidence that a logic-class patch will succeed.
    pub logic_confidence: f64,
    /// The component relevant to the request's error class.
    pub overall_confidence: f64,
}

impl ConfidenceResult {
    /// Returns the component for a class.
    #[must_use]
    pub const fn for_class(&self, class: ErrorClass) -> f64 {
        match class {
            ErrorClass::Syntax => self.syntax_confidence,
            ErrorClass::Logic => self.logic_confidence,
        }
    }
}

/// Numerically stable softmax over a logits vector.
///
/// Subtracts the maximum logit before exponentiating, so magnitudes up to
/// `1e6` and beyond normalize without overflow. Returns an empty vector for
/// empty input; callers must handle that case explicitly.
#[must_use]
pub fn stable_softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        // Degenerate input (all -inf or NaN): fall back to uniform weights.
        let uniform = 1.0 / logits.len() as f64;
        return vec![uniform; logits.len()];
    }
    exps.iter().map(|&e| e / sum).collect()
}

/// Converts logits and historical statistics into bounded confidences.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    blend_weight: f64,
    ema_alpha: f64,
    syntax_rate: f64,
    logic_rate: f64,
}

impl ConfidenceScorer {
    /// Creates a scorer from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            blend_weight: config.blend_weight.clamp(0.0, 1.0),
            ema_alpha: config.ema_alpha.clamp(0.0, 1.0),
            syntax_rate: NEUTRAL_RATE,
            logic_rate: NEUTRAL_RATE,
        }
    }

    /// Returns the moving success rate for a class.
    #[must_use]
    pub const fn historical_rate(&self, class: ErrorClass) -> f64 {
        match class {
            ErrorClass::Syntax => self.syntax_rate,
            ErrorClass::Logic => self.logic_rate,
        }
    }

    /// Scores one attempt.
    ///
    /// `historical_stats` maps [`ErrorClass::as_str`] keys (`"SYNTAX"`,
    /// `"LOGIC"`) to externally observed success rates; a present key
    /// overrides the scorer's internal moving average for that class.
    #[must_use]
    pub fn score(
        &self,
        class: ErrorClass,
        logits: &[f64],
        historical_stats: &BTreeMap<String, f64>,
    ) -> ConfidenceResult {
        let weights = stable_softmax(logits);
        let model_signal = weights
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
            .clamp(0.0, 1.0);
        let model_signal = if weights.is_empty() {
            NEUTRAL_SIGNAL
        } else {
            model_signal
        };

        let blend = |c: ErrorClass| -> f64 {
            let history = historical_stats
                .get(c.as_str())
                .copied()
                .unwrap_or_else(|| self.historical_rate(c))
                .clamp(0.0, 1.0);
            (self.blend_weight * model_signal + (1.0 - self.blend_weight) * history)
                .clamp(0.0, 1.0)
        };

        let syntax_confidence = blend(ErrorClass::Syntax);
        let logic_confidence = blend(ErrorClass::Logic);
        let result = ConfidenceResult {
            syntax_confidence,
            logic_confidence,
            overall_confidence: match class {
                ErrorClass::Syntax => syntax_confidence,
                ErrorClass::Logic => logic_confidence,
            },
        };
        tracing::debug!(
            class = %class,
            model_signal,
            syntax = result.syntax_confidence,
            logic = result.logic_confidence,
            "confidence scored"
        );
        result
    }

    /// Folds an attempt outcome into the per-class moving success rate.
    ///
    /// This is the only mutation path into historical state.
    pub fn record_outcome(&mut self, class: ErrorClass, success: bool) {
        let observed = if success { 1.0 } else { 0.0 };
        let rate = match class {
            ErrorClass::Syntax => &mut self.syntax_rate,
            ErrorClass::Logic => &mut self.logic_rate,
        };
        *rate = (self.ema_alpha * observed + (1.0 - self.ema_alpha) * *rate).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::from_config(&EngineConfig::default())
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let weights = stable_softmax(&[1.0, 2.0, 3.0]);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_softmax_extreme_logits_do_not_overflow() {
        let weights = stable_softmax(&[1e6, -1e6, 0.0]);
        assert!(weights.iter().all(|w| w.is_finite()));
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // The spiked logit takes essentially all of the mass.
        assert!(weights[0] > 0.999);
    }

    #[test]
    fn test_softmax_empty_input() {
        assert!(stable_softmax(&[]).is_empty());
    }

    #[test]
    fn test_empty_logits_use_neutral_signal() {
        let result = scorer().score(ErrorClass::Syntax, &[], &BTreeMap::new());
        // w * 0.5 + (1 - w) * 0.5 = 0.5 for any blend weight.
        assert!((result.syntax_confidence - 0.5).abs() < 1e-9);
        assert!((result.overall_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_outputs_bounded() {
        let result = scorer().score(ErrorClass::Logic, &[100.0, -50.0, 3.0], &BTreeMap::new());
        for value in [
            result.syntax_confidence,
            result.logic_confidence,
            result.overall_confidence,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_overall_tracks_request_class() {
        let mut stats = BTreeMap::new();
        stats.insert("SYNTAX".to_string(), 1.0);
        stats.insert("LOGIC".to_string(), 0.0);
        let result = scorer().score(ErrorClass::Logic, &[0.0], &stats);
        assert!((result.overall_confidence - result.logic_confidence).abs() < f64::EPSILON);
        assert!(result.syntax_confidence > result.logic_confidence);
    }

    #[test]
    fn test_request_stats_override_moving_average() {
        let mut s = scorer();
        for _ in 0..10 {
            s.record_outcome(ErrorClass::Syntax, true);
        }
        let mut stats = BTreeMap::new();
        stats.insert("SYNTAX".to_string(), 0.0);
        let with_override = s.score(ErrorClass::Syntax, &[0.0], &stats);
        let without = s.score(ErrorClass::Syntax, &[0.0], &BTreeMap::new());
        assert!(with_override.syntax_confidence < without.syntax_confidence);
    }

    #[test]
    fn test_record_outcome_moves_rate() {
        let mut s = scorer();
        let before = s.historical_rate(ErrorClass::Logic);
        s.record_outcome(ErrorClass::Logic, true);
        assert!(s.historical_rate(ErrorClass::Logic) > before);
        s.record_outcome(ErrorClass::Logic, false);
        s.record_outcome(ErrorClass::Logic, false);
        assert!(s.historical_rate(ErrorClass::Logic) < before + 0.2);
        // Syntax rate untouched.
        assert_eq!(s.historical_rate(ErrorClass::Syntax), NEUTRAL_RATE);
    }
}
