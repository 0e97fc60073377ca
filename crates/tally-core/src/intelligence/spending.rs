//! Spending Pattern Analyzer
//!
//! Descriptive statistics over one payee's (already filtered) transaction
//! window, plus trend direction from comparing the older and newer halves.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::SpendingConfig;
use crate::models::{Transaction, TrendDirection};
use crate::stats;

/// Descriptive statistics for one payee
///
/// All amounts are magnitudes: a $40 refund and a $40 charge both count as 40.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingStatistics {
    pub payee_id: i64,
    pub transaction_count: usize,
    pub total_amount: f64,
    pub average_amount: f64,
    pub median_amount: f64,
    pub standard_deviation: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub quartiles: [f64; 3],
    pub trend_direction: TrendDirection,
    /// Relative difference between the halves' means, in [0, 1]
    pub trend_strength: f64,
    /// Coefficient of variation of the amounts
    pub volatility: f64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub time_span_days: i64,
    pub outlier_transactions: Vec<Transaction>,
}

impl SpendingStatistics {
    /// Neutral statistics for a window with fewer than two transactions
    pub fn empty(payee_id: i64) -> Self {
        Self {
            payee_id,
            transaction_count: 0,
            total_amount: 0.0,
            average_amount: 0.0,
            median_amount: 0.0,
            standard_deviation: 0.0,
            min_amount: 0.0,
            max_amount: 0.0,
            quartiles: [0.0; 3],
            trend_direction: TrendDirection::Stable,
            trend_strength: 0.0,
            volatility: 0.0,
            first_date: None,
            last_date: None,
            time_span_days: 0,
            outlier_transactions: Vec::new(),
        }
    }

    /// Share of transactions flagged as outliers
    pub fn outlier_ratio(&self) -> f64 {
        if self.transaction_count == 0 {
            return 0.0;
        }
        self.outlier_transactions.len() as f64 / self.transaction_count as f64
    }

    /// Trend as a signed value in [-1, 1]
    pub fn signed_trend(&self) -> f64 {
        self.trend_direction.sign() * self.trend_strength
    }

    pub fn is_outlier(&self, transaction: &Transaction) -> bool {
        self.outlier_transactions.contains(transaction)
    }
}

#[derive(Debug, Clone)]
pub struct SpendingPatternAnalyzer {
    trend_threshold: f64,
}

impl SpendingPatternAnalyzer {
    pub fn new(config: &SpendingConfig) -> Self {
        Self {
            trend_threshold: config.trend_threshold,
        }
    }

    pub fn analyze(&self, payee_id: i64, transactions: &[Transaction]) -> SpendingStatistics {
        let mut sorted = transactions.to_vec();
        sorted.sort_by_key(|tx| tx.date);

        if sorted.len() < 2 {
            return SpendingStatistics::empty(payee_id);
        }

        let amounts: Vec<f64> = sorted.iter().map(Transaction::magnitude).collect();
        let mut ordered = amounts.clone();
        ordered.sort_by(|a, b| a.total_cmp(b));

        let average = stats::mean(&amounts);
        let first_date = sorted[0].date;
        let last_date = sorted[sorted.len() - 1].date;
        let (trend_direction, trend_strength) = self.trend(&sorted);

        let outlier_transactions = stats::outliers(&amounts)
            .into_iter()
            .map(|i| sorted[i].clone())
            .collect();

        SpendingStatistics {
            payee_id,
            transaction_count: sorted.len(),
            total_amount: stats::sanitize(amounts.iter().sum()),
            average_amount: average,
            median_amount: stats::median(&amounts),
            standard_deviation: stats::standard_deviation(&amounts, average),
            min_amount: ordered[0],
            max_amount: ordered[ordered.len() - 1],
            quartiles: stats::quartiles(&ordered),
            trend_direction,
            trend_strength,
            volatility: stats::coefficient_of_variation(&amounts),
            first_date: Some(first_date),
            last_date: Some(last_date),
            time_span_days: (last_date - first_date).num_days(),
            outlier_transactions,
        }
    }

    /// Compare mean magnitudes before and after the window's midpoint date
    fn trend(&self, sorted: &[Transaction]) -> (TrendDirection, f64) {
        let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
            return (TrendDirection::Stable, 0.0);
        };
        let span = (last.date - first.date).num_days();
        if span == 0 {
            return (TrendDirection::Stable, 0.0);
        }
        let midpoint = first.date + Duration::days(span / 2);

        let (older, recent): (Vec<&Transaction>, Vec<&Transaction>) =
            sorted.iter().partition(|tx| tx.date < midpoint);
        if older.is_empty() || recent.is_empty() {
            return (TrendDirection::Stable, 0.0);
        }

        let older_mean = stats::mean(&older.iter().map(|tx| tx.magnitude()).collect::<Vec<_>>());
        let recent_mean = stats::mean(&recent.iter().map(|tx| tx.magnitude()).collect::<Vec<_>>());

        let relative = if older_mean > 0.0 {
            (recent_mean - older_mean) / older_mean
        } else if recent_mean > 0.0 {
            1.0
        } else {
            0.0
        };
        let relative = stats::sanitize(relative).clamp(-1.0, 1.0);

        let direction = if relative > self.trend_threshold {
            TrendDirection::Increasing
        } else if relative < -self.trend_threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        (direction, relative.abs())
    }
}

impl Default for SpendingPatternAnalyzer {
    fn default() -> Self {
        Self { trend_threshold: 0.1 }
    }
}
