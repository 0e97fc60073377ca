//! Seasonality Detector
//!
//! Groups a payee's transactions by calendar month (across all years) and
//! measures how much the monthly averages swing.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::config::SeasonalityConfig;
use crate::models::Transaction;
use crate::stats;

/// Aggregate for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTrend {
    /// 1 = January .. 12 = December
    pub month: u32,
    pub avg_amount: f64,
    pub count: usize,
}

/// Sparse monthly profile: only months with at least one transaction appear
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeasonalProfile {
    /// Ordered by month
    pub months: Vec<SeasonalTrend>,
    /// Mean of the monthly averages
    pub overall_average: f64,
    /// (max monthly average - min monthly average) / overall average
    pub amplitude: f64,
    pub is_seasonal: bool,
}

impl SeasonalProfile {
    pub fn month(&self, month: u32) -> Option<&SeasonalTrend> {
        self.months.iter().find(|m| m.month == month)
    }

    /// Multiplier for `month` relative to the overall average
    ///
    /// `None` when the month was never observed or the profile is not seasonal.
    pub fn multiplier_for(&self, month: u32) -> Option<f64> {
        if !self.is_seasonal || self.overall_average <= 0.0 {
            return None;
        }
        self.month(month)
            .map(|m| stats::sanitize(m.avg_amount / self.overall_average))
    }
}

#[derive(Debug, Clone)]
pub struct SeasonalityDetector {
    min_months: usize,
    min_amplitude: f64,
}

impl SeasonalityDetector {
    pub fn new(config: &SeasonalityConfig) -> Self {
        Self {
            min_months: config.min_months,
            min_amplitude: config.min_amplitude,
        }
    }

    /// Minimum observed months before any seasonal adjustment applies
    pub fn min_months(&self) -> usize {
        self.min_months
    }

    pub fn monthly_trends(&self, transactions: &[Transaction]) -> Vec<SeasonalTrend> {
        let mut by_month: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for tx in transactions {
            let entry = by_month.entry(tx.date.month()).or_insert((0.0, 0));
            entry.0 += tx.magnitude();
            entry.1 += 1;
        }

        by_month
            .into_iter()
            .map(|(month, (total, count))| SeasonalTrend {
                month,
                avg_amount: stats::sanitize(total / count as f64),
                count,
            })
            .collect()
    }

    pub fn analyze(&self, transactions: &[Transaction]) -> SeasonalProfile {
        let months = self.monthly_trends(transactions);
        if months.is_empty() {
            return SeasonalProfile::default();
        }

        let averages: Vec<f64> = months.iter().map(|m| m.avg_amount).collect();
        let overall_average = stats::mean(&averages);
        let (min, max) = averages
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

        let amplitude = if overall_average > 0.0 {
            stats::sanitize((max - min) / overall_average)
        } else {
            0.0
        };
        let is_seasonal = months.len() >= self.min_months && amplitude >= self.min_amplitude;

        SeasonalProfile {
            months,
            overall_average,
            amplitude,
            is_seasonal,
        }
    }
}

impl Default for SeasonalityDetector {
    fn default() -> Self {
        Self {
            min_months: 3,
            min_amplitude: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(y: i32, m: u32, amount: f64) -> Transaction {
        Transaction::new(0, 1, NaiveDate::from_ymd_opt(y, m, 10).unwrap(), Some(amount))
    }

    #[test]
    fn test_sparse_months_across_years() {
        let txs = vec![
            tx(2023, 12, -200.0),
            tx(2024, 12, -300.0),
            tx(2024, 3, -50.0),
        ];
        let trends = SeasonalityDetector::default().monthly_trends(&txs);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].month, 3);
        assert_eq!(trends[1].month, 12);
        assert_eq!(trends[1].avg_amount, 250.0);
        assert_eq!(trends[1].count, 2);
    }

    #[test]
    fn test_empty_history() {
        let profile = SeasonalityDetector::default().analyze(&[]);
        assert!(profile.months.is_empty());
        assert!(!profile.is_seasonal);
        assert_eq!(profile.multiplier_for(1), None);
    }

    #[test]
    fn test_seasonal_profile_multipliers() {
        let txs = vec![
            tx(2024, 1, -100.0),
            tx(2024, 2, -100.0),
            tx(2024, 11, -100.0),
            tx(2024, 12, -300.0),
        ];
        let profile = SeasonalityDetector::default().analyze(&txs);
        assert!(profile.is_seasonal);
        assert_eq!(profile.overall_average, 150.0);
        assert_eq!(profile.multiplier_for(12), Some(2.0));
        // Unobserved month has no multiplier
        assert_eq!(profile.multiplier_for(6), None);
    }

    #[test]
    fn test_flat_or_short_history_is_not_seasonal() {
        let flat = vec![tx(2024, 1, -50.0), tx(2024, 2, -50.0), tx(2024, 3, -50.0)];
        let profile = SeasonalityDetector::default().analyze(&flat);
        assert_eq!(profile.amplitude, 0.0);
        assert!(!profile.is_seasonal);

        let short = vec![tx(2024, 1, -10.0), tx(2024, 7, -90.0)];
        let profile = SeasonalityDetector::default().analyze(&short);
        assert!(profile.amplitude > 1.0);
        assert!(!profile.is_seasonal);
    }
}
