//! Prediction Engine
//!
//! Next-transaction prediction and monthly budget suggestion, built on the
//! spending, frequency and seasonality analyzers.
//!
//! Tiers are tried in the order ai -> ml -> statistical. This module
//! implements the two local tiers; the ai tier is layered on top by
//! [`super::engine::IntelligenceService`], which owns the language-model client.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{PredictionConfig, PredictionTier};
use crate::models::{Frequency, Transaction, AVERAGE_MONTH_DAYS};
use crate::stats;

use super::frequency::FrequencyPattern;
use super::seasonality::SeasonalProfile;
use super::spending::SpendingStatistics;

/// Which tier actually produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
    Statistical,
    Ml,
    Ai,
    InsufficientData,
}

impl PredictionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::Ml => "ml",
            Self::Ai => "ai",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl From<PredictionTier> for PredictionMethod {
    fn from(tier: PredictionTier) -> Self {
        match tier {
            PredictionTier::Statistical => Self::Statistical,
            PredictionTier::Ml => Self::Ml,
            PredictionTier::Ai => Self::Ai,
        }
    }
}

impl std::fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextTransactionPrediction {
    pub date: Option<NaiveDate>,
    pub amount: f64,
    /// `[predicted - stddev, predicted + stddev]`, floored at 0
    pub amount_range: [f64; 2],
    pub confidence: f64,
    /// Tier that ran
    pub method: PredictionMethod,
    /// Tier that was requested
    pub tier: PredictionTier,
    /// Narrative from the ai tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl NextTransactionPrediction {
    pub fn insufficient(tier: PredictionTier) -> Self {
        Self {
            date: None,
            amount: 0.0,
            amount_range: [0.0, 0.0],
            confidence: 0.0,
            method: PredictionMethod::InsufficientData,
            tier,
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAdjustment {
    pub month: u32,
    pub multiplier: f64,
    /// Change applied to the base monthly amount
    pub amount_delta: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSuggestion {
    pub total_suggested: f64,
    /// Amount before seasonal adjustment
    pub base_monthly_amount: f64,
    pub occurrences_per_month: f64,
    /// Month (1-12) the suggestion is for
    pub target_month: u32,
    pub confidence: f64,
    pub tier: PredictionTier,
    pub seasonal_adjustments: Vec<SeasonalAdjustment>,
}

/// Analyzer output a prediction is computed from
#[derive(Debug, Clone, Copy)]
pub struct PredictionInput<'a> {
    pub transactions: &'a [Transaction],
    pub statistics: &'a SpendingStatistics,
    pub frequency: &'a FrequencyPattern,
    pub seasonality: &'a SeasonalProfile,
}

impl PredictionInput<'_> {
    fn chronological(&self) -> Vec<&Transaction> {
        let mut sorted: Vec<&Transaction> = self.transactions.iter().collect();
        sorted.sort_by_key(|tx| tx.date);
        sorted
    }

    fn last_date(&self) -> Option<NaiveDate> {
        self.transactions.iter().map(|tx| tx.date).max()
    }
}

// Minimum history before the ml tier is worth running
const ML_MIN_TRANSACTIONS: usize = 3;
// Fraction of the detected trend carried into the next amount
const TREND_DAMPING: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct NextTransactionPredictor {
    recency_decay: f64,
    recent_window: usize,
}

impl NextTransactionPredictor {
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            recency_decay: config.recency_decay,
            recent_window: config.recent_window,
        }
    }

    /// Predict with the requested tier, falling back ml -> statistical
    ///
    /// For [`PredictionTier::Ai`] this returns the local base the ai tier refines.
    pub fn predict(&self, input: &PredictionInput<'_>, tier: PredictionTier) -> NextTransactionPrediction {
        if input.frequency.detected_frequency.is_none() {
            return NextTransactionPrediction::insufficient(tier);
        }

        let mut current = match tier {
            PredictionTier::Ai => PredictionTier::Ml,
            other => other,
        };

        loop {
            let prediction = match current {
                PredictionTier::Statistical => self.statistical(input),
                PredictionTier::Ml | PredictionTier::Ai => self.ml(input),
            };
            if let Some(mut prediction) = prediction {
                prediction.tier = tier;
                return prediction;
            }
            match current.fallback() {
                Some(next) => {
                    debug!(from = %current, to = %next, "Prediction tier unavailable, falling back");
                    current = next;
                }
                None => {
                    warn!("No prediction tier produced a result");
                    return NextTransactionPrediction::insufficient(tier);
                }
            }
        }
    }

    /// Last date plus the mean interval; recency-weighted amount
    pub fn statistical(&self, input: &PredictionInput<'_>) -> Option<NextTransactionPrediction> {
        input.frequency.detected_frequency?;
        let last = input.last_date()?;

        let amounts: Vec<f64> = input.chronological().iter().map(|tx| tx.magnitude()).collect();
        let amount = stats::recency_weighted_mean(&amounts, self.recency_decay, self.recent_window);
        let spread = input.statistics.standard_deviation;

        let confidence = input.frequency.confidence * (1.0 - 0.5 * stats::unit(input.statistics.volatility));

        Some(NextTransactionPrediction {
            date: Some(advance(last, input.frequency.average_days_between)),
            amount,
            amount_range: range(amount, spread),
            confidence: stats::unit(confidence),
            method: PredictionMethod::Statistical,
            tier: PredictionTier::Statistical,
            explanation: None,
        })
    }

    /// Outlier-free recency-weighted amount with damped trend; robust interval
    pub fn ml(&self, input: &PredictionInput<'_>) -> Option<NextTransactionPrediction> {
        input.frequency.detected_frequency?;
        if input.transactions.len() < ML_MIN_TRANSACTIONS {
            return None;
        }
        let last = input.last_date()?;

        let amounts = self.clean_amounts(input);
        let base = stats::recency_weighted_mean(&amounts, self.recency_decay, self.recent_window);
        let amount = stats::sanitize(base * (1.0 + clean_trend(&amounts) * TREND_DAMPING));
        let spread = stats::standard_deviation(&amounts, stats::mean(&amounts));

        // Gaps and bursts skew the mean interval; the median shrugs them off
        let patterns = &input.frequency.irregular_patterns;
        let interval = if input.frequency.detected_frequency == Some(Frequency::Irregular)
            || !patterns.unusual_gaps.is_empty()
            || !patterns.clusters.is_empty()
        {
            input.frequency.median_days_between
        } else {
            input.frequency.average_days_between
        };

        let timing = 0.5 * input.frequency.confidence + 0.5 * input.frequency.predictability_score;
        let confidence = timing * (1.0 - 0.5 * stats::unit(stats::coefficient_of_variation(&amounts)));

        Some(NextTransactionPrediction {
            date: Some(advance(last, interval)),
            amount,
            amount_range: range(amount, spread),
            confidence: stats::unit(confidence),
            method: PredictionMethod::Ml,
            tier: PredictionTier::Ml,
            explanation: None,
        })
    }

    /// Chronological magnitudes with outliers removed (all of them if too few remain)
    fn clean_amounts(&self, input: &PredictionInput<'_>) -> Vec<f64> {
        let chronological = input.chronological();
        let clean: Vec<f64> = chronological
            .iter()
            .filter(|tx| !input.statistics.is_outlier(tx))
            .map(|tx| tx.magnitude())
            .collect();
        if clean.len() >= 2 {
            clean
        } else {
            chronological.iter().map(|tx| tx.magnitude()).collect()
        }
    }

    /// Monthly average amount the budget engine scales by occurrences
    fn average_amount(&self, input: &PredictionInput<'_>, tier: PredictionTier) -> f64 {
        match tier {
            PredictionTier::Statistical => input.statistics.average_amount,
            PredictionTier::Ml | PredictionTier::Ai => {
                let amounts = self.clean_amounts(input);
                stats::sanitize(stats::mean(&amounts) * (1.0 + clean_trend(&amounts) * TREND_DAMPING))
            }
        }
    }
}

impl Default for NextTransactionPredictor {
    fn default() -> Self {
        Self {
            recency_decay: 0.8,
            recent_window: 12,
        }
    }
}

/// Signed relative change between the older and newer half of `amounts`, in [-1, 1]
fn clean_trend(amounts: &[f64]) -> f64 {
    if amounts.len() < 2 {
        return 0.0;
    }
    let (older, recent) = amounts.split_at(amounts.len() / 2);
    let older_mean = stats::mean(older);
    if older_mean <= 0.0 {
        return 0.0;
    }
    stats::sanitize((stats::mean(recent) - older_mean) / older_mean).clamp(-1.0, 1.0)
}

fn advance(last: NaiveDate, interval_days: f64) -> NaiveDate {
    let days = stats::sanitize(interval_days).round().max(1.0) as i64;
    Duration::try_days(days)
        .and_then(|d| last.checked_add_signed(d))
        .unwrap_or(NaiveDate::MAX)
}

fn range(amount: f64, spread: f64) -> [f64; 2] {
    let spread = stats::sanitize(spread).abs();
    [(amount - spread).max(0.0), amount + spread]
}

#[derive(Debug, Clone)]
pub struct BudgetSuggestionEngine {
    predictor: NextTransactionPredictor,
    min_seasonal_months: usize,
}

impl BudgetSuggestionEngine {
    pub fn new(predictor: NextTransactionPredictor, min_seasonal_months: usize) -> Self {
        Self {
            predictor,
            min_seasonal_months,
        }
    }

    /// Suggested spend for `target_month`
    ///
    /// `confidence` comes from the confidence scorer. The ai tier has no
    /// budget-specific refinement, so it runs as ml.
    pub fn suggest(
        &self,
        input: &PredictionInput<'_>,
        tier: PredictionTier,
        target_month: u32,
        confidence: f64,
    ) -> BudgetSuggestion {
        let ran = match tier {
            PredictionTier::Ai if input.transactions.len() >= ML_MIN_TRANSACTIONS => {
                PredictionTier::Ml
            }
            PredictionTier::Ml | PredictionTier::Ai
                if input.transactions.len() < ML_MIN_TRANSACTIONS =>
            {
                PredictionTier::Statistical
            }
            other => other,
        };

        let Some(frequency) = input.frequency.detected_frequency else {
            return BudgetSuggestion {
                total_suggested: 0.0,
                base_monthly_amount: 0.0,
                occurrences_per_month: 0.0,
                target_month,
                confidence: 0.0,
                tier: ran,
                seasonal_adjustments: Vec::new(),
            };
        };

        let occurrences = frequency
            .occurrences_per_month()
            .unwrap_or_else(|| observed_monthly_rate(input.statistics));
        let base = stats::sanitize(self.predictor.average_amount(input, ran) * occurrences);

        let mut total = base;
        let mut seasonal_adjustments = Vec::new();
        if input.seasonality.months.len() >= self.min_seasonal_months {
            if let Some(multiplier) = input.seasonality.multiplier_for(target_month) {
                total = stats::sanitize(base * multiplier);
                seasonal_adjustments.push(SeasonalAdjustment {
                    month: target_month,
                    multiplier,
                    amount_delta: total - base,
                    reason: format!(
                        "Month {} averages {:.0}% of the typical month",
                        target_month,
                        multiplier * 100.0
                    ),
                });
            }
        }

        BudgetSuggestion {
            total_suggested: total,
            base_monthly_amount: base,
            occurrences_per_month: occurrences,
            target_month,
            confidence: stats::unit(confidence),
            tier: ran,
            seasonal_adjustments,
        }
    }
}

impl Default for BudgetSuggestionEngine {
    fn default() -> Self {
        Self::new(NextTransactionPredictor::default(), 3)
    }
}

/// Transactions per month actually observed (for irregular payees)
fn observed_monthly_rate(statistics: &SpendingStatistics) -> f64 {
    let months = (statistics.time_span_days as f64 / AVERAGE_MONTH_DAYS).max(1.0);
    stats::sanitize(statistics.transaction_count as f64 / months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::frequency::FrequencyPatternDetector;
    use crate::intelligence::seasonality::SeasonalityDetector;
    use crate::intelligence::spending::SpendingPatternAnalyzer;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        transactions: Vec<Transaction>,
        statistics: SpendingStatistics,
        frequency: FrequencyPattern,
        seasonality: SeasonalProfile,
    }

    impl Fixture {
        fn new(transactions: Vec<Transaction>) -> Self {
            Self {
                statistics: SpendingPatternAnalyzer::default().analyze(1, &transactions),
                frequency: FrequencyPatternDetector::default().detect(&transactions),
                seasonality: SeasonalityDetector::default().analyze(&transactions),
                transactions,
            }
        }

        fn input(&self) -> PredictionInput<'_> {
            PredictionInput {
                transactions: &self.transactions,
                statistics: &self.statistics,
                frequency: &self.frequency,
                seasonality: &self.seasonality,
            }
        }
    }

    fn monthly(amounts: &[f64]) -> Vec<Transaction> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Transaction::new(i as i64 + 1, 1, date(2024, i as u32 + 1, 1), Some(*a)))
            .collect()
    }

    #[test]
    fn test_no_transactions_is_insufficient() {
        let fixture = Fixture::new(vec![]);
        let prediction = NextTransactionPredictor::default().predict(&fixture.input(), PredictionTier::Ml);
        assert_eq!(prediction.method, PredictionMethod::InsufficientData);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.date, None);
    }

    #[test]
    fn test_statistical_prediction() {
        let fixture = Fixture::new(monthly(&[-100.0; 5]));
        let prediction = NextTransactionPredictor::default()
            .predict(&fixture.input(), PredictionTier::Statistical);

        assert_eq!(prediction.method, PredictionMethod::Statistical);
        assert_eq!(prediction.tier, PredictionTier::Statistical);
        assert_eq!(prediction.amount, 100.0);
        assert_eq!(prediction.amount_range, [100.0, 100.0]);
        // May 1 + round(30.25) days
        assert_eq!(prediction.date, Some(date(2024, 5, 31)));
        assert!(prediction.confidence > 0.5);
    }

    #[test]
    fn test_ml_ignores_outliers() {
        let fixture = Fixture::new(monthly(&[-50.0, -50.0, -400.0, -50.0, -50.0, -50.0]));
        let predictor = NextTransactionPredictor::default();

        let statistical = predictor.statistical(&fixture.input()).unwrap();
        let ml = predictor.ml(&fixture.input()).unwrap();

        assert!(statistical.amount > 50.0);
        assert!((ml.amount - 50.0).abs() < 1e-9);
        assert_eq!(ml.method, PredictionMethod::Ml);
    }

    #[test]
    fn test_ml_follows_clean_trend() {
        let fixture = Fixture::new(monthly(&[-40.0, -40.0, -60.0, -60.0]));
        let ml = NextTransactionPredictor::default().ml(&fixture.input()).unwrap();
        let base = stats::recency_weighted_mean(&[40.0, 40.0, 60.0, 60.0], 0.8, 12);
        assert!(ml.amount > base);
    }

    #[test]
    fn test_ml_falls_back_to_statistical_with_short_history() {
        let fixture = Fixture::new(monthly(&[-20.0, -20.0]));
        let prediction = NextTransactionPredictor::default().predict(&fixture.input(), PredictionTier::Ml);
        assert_eq!(prediction.method, PredictionMethod::Statistical);
        assert_eq!(prediction.tier, PredictionTier::Ml);
    }

    #[test]
    fn test_ai_request_returns_local_base() {
        let fixture = Fixture::new(monthly(&[-20.0, -20.0, -20.0, -20.0]));
        let prediction = NextTransactionPredictor::default().predict(&fixture.input(), PredictionTier::Ai);
        assert_eq!(prediction.method, PredictionMethod::Ml);
        assert_eq!(prediction.tier, PredictionTier::Ai);
    }

    #[test]
    fn test_range_never_negative() {
        let fixture = Fixture::new(monthly(&[-1.0, -30.0, -2.0, -25.0]));
        let prediction = NextTransactionPredictor::default()
            .predict(&fixture.input(), PredictionTier::Statistical);
        assert!(prediction.amount_range[0] >= 0.0);
        assert!(prediction.amount_range[0] <= prediction.amount);
        assert!(prediction.amount <= prediction.amount_range[1]);
    }

    #[test]
    fn test_budget_monthly() {
        let fixture = Fixture::new(monthly(&[-100.0; 5]));
        let budget = BudgetSuggestionEngine::default().suggest(
            &fixture.input(),
            PredictionTier::Statistical,
            6,
            0.7,
        );
        assert!((budget.total_suggested - 100.0 * AVERAGE_MONTH_DAYS / 30.0).abs() < 1e-9);
        assert!(budget.seasonal_adjustments.is_empty());
        assert_eq!(budget.confidence, 0.7);
    }

    #[test]
    fn test_budget_weekly_scales_by_occurrences() {
        let start = date(2024, 3, 4);
        let txs: Vec<Transaction> = (0..5)
            .map(|i| Transaction::new(i, 1, start + Duration::days(i * 7), Some(-10.0)))
            .collect();
        let fixture = Fixture::new(txs);
        let budget = BudgetSuggestionEngine::default().suggest(
            &fixture.input(),
            PredictionTier::Statistical,
            4,
            0.5,
        );
        assert!((budget.occurrences_per_month - AVERAGE_MONTH_DAYS / 7.0).abs() < 1e-9);
        assert!(budget.total_suggested > 40.0);
    }

    #[test]
    fn test_budget_seasonal_adjustment() {
        let txs = vec![
            Transaction::new(1, 1, date(2023, 10, 15), Some(-100.0)),
            Transaction::new(2, 1, date(2023, 11, 15), Some(-100.0)),
            Transaction::new(3, 1, date(2023, 12, 15), Some(-300.0)),
            Transaction::new(4, 1, date(2024, 1, 15), Some(-100.0)),
        ];
        let fixture = Fixture::new(txs);
        let budget = BudgetSuggestionEngine::default().suggest(
            &fixture.input(),
            PredictionTier::Statistical,
            12,
            0.5,
        );
        assert_eq!(budget.seasonal_adjustments.len(), 1);
        assert_eq!(budget.seasonal_adjustments[0].month, 12);
        assert!(budget.total_suggested > budget.base_monthly_amount);
    }

    #[test]
    fn test_budget_without_pattern_is_zero() {
        let fixture = Fixture::new(monthly(&[-75.0]));
        let budget = BudgetSuggestionEngine::default().suggest(
            &fixture.input(),
            PredictionTier::Ml,
            2,
            0.9,
        );
        assert_eq!(budget.total_suggested, 0.0);
        assert_eq!(budget.confidence, 0.0);
        assert_eq!(budget.tier, PredictionTier::Statistical);
    }
}
