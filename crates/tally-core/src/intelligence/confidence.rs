//! Confidence Scorer
//!
//! Three independently computable sub-scores:
//!
//! - **Data quality** - how much history there is (count and time span)
//! - **Pattern reliability** - how regular the timing is, penalized by outliers
//! - **Prediction accuracy** - how close past predictions were, from user feedback
//!
//! `overall` is the equal-weight mean of the three. Without feedback the
//! accuracy weight is redistributed to the other two, so `overall` is the mean
//! of data quality and pattern reliability.

use serde::{Deserialize, Serialize};

use crate::config::ConfidenceConfig;
use crate::models::PredictionFeedback;
use crate::stats;

use super::frequency::FrequencyPattern;
use super::spending::SpendingStatistics;

/// Neutral accuracy used when no feedback exists
pub const NEUTRAL_ACCURACY: f64 = 0.5;

/// One input to a sub-score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactor {
    pub name: String,
    pub value: f64,
    pub description: String,
}

impl ConfidenceFactor {
    pub fn new(name: &str, value: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: stats::unit(value),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: f64,
    pub factors: Vec<ConfidenceFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall: f64,
    pub data_quality: SubScore,
    pub pattern_reliability: SubScore,
    pub prediction_accuracy: SubScore,
    /// Whether feedback contributed to `overall`
    pub has_feedback: bool,
    pub explanation: String,
}

/// Combine sub-scores into the overall confidence
///
/// Monotone non-decreasing in each argument and always within [0, 1].
pub fn combine(data_quality: f64, pattern_reliability: f64, prediction_accuracy: Option<f64>) -> f64 {
    let dq = stats::unit(data_quality);
    let pr = stats::unit(pattern_reliability);
    match prediction_accuracy {
        Some(pa) => stats::unit((dq + pr + stats::unit(pa)) / 3.0),
        None => stats::unit((dq + pr) / 2.0),
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    saturation_transactions: usize,
    saturation_days: i64,
}

impl ConfidenceScorer {
    pub fn new(config: &ConfidenceConfig) -> Self {
        Self {
            saturation_transactions: config.saturation_transactions,
            saturation_days: config.saturation_days,
        }
    }

    pub fn data_quality(&self, statistics: &SpendingStatistics) -> SubScore {
        let count = stats::saturate(
            statistics.transaction_count as f64,
            self.saturation_transactions as f64,
        );
        let span = stats::saturate(
            statistics.time_span_days as f64,
            self.saturation_days as f64,
        );

        SubScore {
            score: stats::unit(0.6 * count + 0.4 * span),
            factors: vec![
                ConfidenceFactor::new(
                    "transaction_count",
                    count,
                    format!(
                        "{} of {} transactions needed for full weight",
                        statistics.transaction_count.min(self.saturation_transactions),
                        self.saturation_transactions
                    ),
                ),
                ConfidenceFactor::new(
                    "time_span",
                    span,
                    format!("History covers {} days", statistics.time_span_days),
                ),
            ],
        }
    }

    pub fn pattern_reliability(
        &self,
        frequency: &FrequencyPattern,
        statistics: &SpendingStatistics,
    ) -> SubScore {
        let regularity = if frequency.detected_frequency.is_some() {
            stats::unit(frequency.regularity_score)
        } else {
            0.0
        };
        let outlier_ratio = statistics.outlier_ratio();
        let cleanliness = 1.0 - stats::unit(outlier_ratio * 2.0);

        let score = if frequency.detected_frequency.is_some() {
            stats::unit(0.7 * regularity + 0.3 * cleanliness)
        } else {
            0.0
        };

        SubScore {
            score,
            factors: vec![
                ConfidenceFactor::new(
                    "regularity",
                    regularity,
                    match frequency.detected_frequency {
                        Some(f) => format!("Timing looks {} (regularity {:.2})", f, regularity),
                        None => "Not enough transactions to judge timing".to_string(),
                    },
                ),
                ConfidenceFactor::new(
                    "outliers",
                    cleanliness,
                    format!(
                        "{} of {} amounts are outliers",
                        statistics.outlier_transactions.len(),
                        statistics.transaction_count
                    ),
                ),
            ],
        }
    }

    /// Mean accuracy of past predictions (`None` without feedback)
    ///
    /// A corrected value scores `1 - relative error`; a rating maps 1..5 to 0..1.
    pub fn prediction_accuracy(&self, feedback: &[PredictionFeedback]) -> Option<SubScore> {
        let accuracies: Vec<f64> = feedback.iter().filter_map(feedback_accuracy).collect();
        if accuracies.is_empty() {
            return None;
        }

        let score = stats::unit(stats::mean(&accuracies));
        Some(SubScore {
            score,
            factors: vec![ConfidenceFactor::new(
                "feedback",
                score,
                format!("Average accuracy over {} feedback records", accuracies.len()),
            )],
        })
    }

    pub fn score(
        &self,
        statistics: &SpendingStatistics,
        frequency: &FrequencyPattern,
        feedback: &[PredictionFeedback],
    ) -> ConfidenceScore {
        let data_quality = self.data_quality(statistics);
        let pattern_reliability = self.pattern_reliability(frequency, statistics);
        let accuracy = self.prediction_accuracy(feedback);
        let has_feedback = accuracy.is_some();

        let overall = combine(
            data_quality.score,
            pattern_reliability.score,
            accuracy.as_ref().map(|a| a.score),
        );

        let prediction_accuracy = accuracy.unwrap_or_else(|| SubScore {
            score: NEUTRAL_ACCURACY,
            factors: vec![ConfidenceFactor::new(
                "feedback",
                NEUTRAL_ACCURACY,
                "No feedback on past predictions yet",
            )],
        });

        let explanation = explain(
            overall,
            statistics,
            &data_quality,
            &pattern_reliability,
            has_feedback.then_some(&prediction_accuracy),
        );

        ConfidenceScore {
            overall,
            data_quality,
            pattern_reliability,
            prediction_accuracy,
            has_feedback,
            explanation,
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            saturation_transactions: 20,
            saturation_days: 365,
        }
    }
}

fn feedback_accuracy(feedback: &PredictionFeedback) -> Option<f64> {
    if let Some(corrected) = feedback.corrected_value {
        let original = feedback.original_value;
        let error = (original - corrected).abs();
        let accuracy = if original.abs() > f64::EPSILON {
            1.0 - (error / original.abs()).min(1.0)
        } else if error <= f64::EPSILON {
            1.0
        } else {
            0.0
        };
        return Some(stats::unit(accuracy));
    }
    feedback
        .rating
        .map(|r| stats::unit((f64::from(r.clamp(1, 5)) - 1.0) / 4.0))
}

fn level(overall: f64) -> &'static str {
    if overall >= 0.75 {
        "High"
    } else if overall >= 0.45 {
        "Moderate"
    } else {
        "Low"
    }
}

/// Deterministic summary naming the weakest included sub-score
fn explain(
    overall: f64,
    statistics: &SpendingStatistics,
    data_quality: &SubScore,
    pattern_reliability: &SubScore,
    prediction_accuracy: Option<&SubScore>,
) -> String {
    let mut limiting = ("data", data_quality.score);
    if pattern_reliability.score < limiting.1 {
        limiting = ("pattern", pattern_reliability.score);
    }
    if let Some(accuracy) = prediction_accuracy {
        if accuracy.score < limiting.1 {
            limiting = ("accuracy", accuracy.score);
        }
    }

    let detail = match limiting.0 {
        "data" => format!(
            "limited history ({} transactions over {} days)",
            statistics.transaction_count, statistics.time_span_days
        ),
        "pattern" => "irregular timing or unusual amounts".to_string(),
        _ => "past predictions for this payee were often corrected".to_string(),
    };

    format!(
        "{} confidence ({:.0}%). Main limiting factor: {}.",
        level(overall),
        overall * 100.0,
        detail
    )
}
