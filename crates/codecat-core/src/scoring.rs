//! Quality score aggregation.
//!
//! Blends the heuristic rubric total with the external qualitative score:
//!
//! ```text
//! final = w_h * (heuristic * 10 / ceiling) + w_q * (qualitative * 10 / q_max)
//! ```
//!
//! When the qualitative score is unavailable the heuristic score alone is
//! used at full scale and the breakdown is flagged as degraded.

use std::collections::BTreeMap;

use codecat_state::{AnalysisReport, QualityBreakdown};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SCORE_MAX: f64 = 10.0;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Blend weights and the qualitative scorer's declared range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub heuristic: f64,
    pub qualitative: f64,
    /// Upper bound of the qualitative scorer's scale.
    pub qualitative_max: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            heuristic: 0.4,
            qualitative: 0.6,
            qualitative_max: 10.0,
        }
    }
}

impl ScoreWeights {
    /// Weights with the qualitative share derived from the heuristic one.
    pub fn with_heuristic(heuristic: f64) -> Self {
        Self {
            heuristic,
            qualitative: 1.0 - heuristic,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);
        if !in_range(self.heuristic)
            || !in_range(self.qualitative)
            || (self.heuristic + self.qualitative - 1.0).abs() > WEIGHT_TOLERANCE
        {
            return Err(ConfigError::InvalidWeights {
                heuristic: self.heuristic,
                qualitative: self.qualitative,
            });
        }
        if !self.qualitative_max.is_finite() || self.qualitative_max <= 0.0 {
            return Err(ConfigError::InvalidQualitativeMax(self.qualitative_max));
        }
        Ok(())
    }
}

/// What the qualitative scorer returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeScore {
    pub score: f64,
    pub commentary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualitativeSignal<'a> {
    Available(&'a QualitativeScore),
    /// The scorer failed permanently or ran out of retries.
    Unavailable(&'a str),
}

/// Final score with its breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedScore {
    pub score: f64,
    pub breakdown: QualityBreakdown,
}

/// Combine a heuristic report with the qualitative signal.
///
/// Always returns a score in `[0, 10]`, rounded to one decimal.
pub fn aggregate(
    report: &AnalysisReport,
    signal: QualitativeSignal<'_>,
    weights: &ScoreWeights,
) -> AggregatedScore {
    let heuristic_normalized = if report.ceiling > 0.0 {
        bounded(report.total * SCORE_MAX / report.ceiling)
    } else {
        0.0
    };

    let (raw, qualitative_normalized, commentary, degradation_reason) = match signal {
        QualitativeSignal::Available(q) => {
            let clamped = if q.score.is_nan() {
                0.0
            } else {
                q.score.clamp(0.0, weights.qualitative_max)
            };
            let normalized = clamped * SCORE_MAX / weights.qualitative_max;
            let blended = weights.heuristic * heuristic_normalized + weights.qualitative * normalized;
            (blended, Some(normalized), q.commentary.clone(), None)
        }
        QualitativeSignal::Unavailable(reason) => {
            (heuristic_normalized, None, None, Some(reason.to_string()))
        }
    };

    let sub_scores: BTreeMap<_, _> = report
        .criteria
        .iter()
        .map(|c| (c.name.clone(), c.clone()))
        .collect();

    AggregatedScore {
        score: round_tenth(bounded(raw)),
        breakdown: QualityBreakdown {
            sub_scores,
            heuristic_total: report.total,
            heuristic_ceiling: report.ceiling,
            heuristic_normalized,
            qualitative_normalized,
            heuristic_weight: weights.heuristic,
            qualitative_weight: weights.qualitative,
            commentary,
            degraded: degradation_reason.is_some(),
            degradation_reason,
        },
    }
}

fn bounded(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, SCORE_MAX)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
