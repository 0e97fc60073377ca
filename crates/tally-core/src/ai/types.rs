//! AI backend request/response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Frequency, TrendDirection};

/// What the language model sees about a payee when refining a prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionContext {
    pub payee_name: String,
    pub frequency: Option<Frequency>,
    pub average_days_between: f64,
    /// Newest last, magnitudes only
    pub recent_amounts: Vec<f64>,
    /// Local (ml or statistical) prediction being refined
    pub base_amount: f64,
    pub base_date: Option<NaiveDate>,
    pub trend: TrendDirection,
    pub trend_strength: f64,
    pub volatility: f64,
}

impl PredictionContext {
    /// Render the refinement prompt
    pub fn prompt(&self) -> String {
        let amounts = self
            .recent_amounts
            .iter()
            .map(|a| format!("{:.2}", a))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are reviewing a spending forecast for the payee \"{payee}\".\n\
             Recurrence: {frequency} (every {days:.1} days on average)\n\
             Recent amounts (oldest to newest): [{amounts}]\n\
             Trend: {trend} (strength {strength:.2}), volatility {volatility:.2}\n\
             Current forecast: {amount:.2} on {date}\n\n\
             Respond with a single JSON object:\n\
             {{\"amount\": <number or null>, \"days_until_next\": <integer or null>, \
             \"confidence\": <0-1 or null>, \"explanation\": \"<one or two sentences>\"}}\n\
             Only change amount or timing if the history clearly supports it.",
            payee = self.payee_name,
            frequency = self
                .frequency
                .map(|f| f.as_str())
                .unwrap_or("unknown"),
            days = self.average_days_between,
            amounts = amounts,
            trend = self.trend.as_str(),
            strength = self.trend_strength,
            volatility = self.volatility,
            amount = self.base_amount,
            date = self
                .base_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        )
    }
}

/// Refinement suggested by the language model
///
/// Every numeric field is optional: the model may only contribute a narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiRefinement {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub days_until_next: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub explanation: String,
}
