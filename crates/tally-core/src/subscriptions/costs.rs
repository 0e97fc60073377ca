//! Cost, renewal and usage analysis for a subscription's charge history

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::SubscriptionConfig;
use crate::intelligence::{FrequencyPattern, SpendingStatistics};
use crate::models::{BillingCycle, Transaction, TrendDirection, AVERAGE_MONTH_DAYS};
use crate::stats;

/// Amount charged per month for a given billing cycle
pub fn monthly_equivalent(amount: f64, cycle: BillingCycle) -> f64 {
    stats::sanitize(amount * cycle.cycles_per_month())
}

/// Change between two consecutive charges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub date: NaiveDate,
    pub previous_amount: f64,
    pub new_amount: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub payee_id: i64,
    pub charge_count: usize,
    pub currency: String,
    pub billing_cycle: Option<BillingCycle>,
    /// Latest charge
    pub current_cost: f64,
    /// First charge
    pub original_cost: f64,
    pub average_cost: f64,
    pub total_spent: f64,
    pub monthly_equivalent: f64,
    pub annual_equivalent: f64,
    pub trend: TrendDirection,
    pub trend_strength: f64,
    pub price_changes: Vec<PriceChange>,
    /// Current cost exceeds the original by either configured threshold
    pub price_increase_alert: bool,
}

/// Everything the cost functions need about one payee
pub struct ChargeHistory<'a> {
    pub payee_id: i64,
    /// Expenses ordered by date
    pub transactions: &'a [Transaction],
    pub statistics: &'a SpendingStatistics,
    pub pattern: &'a FrequencyPattern,
    pub billing_cycle: Option<BillingCycle>,
}

impl ChargeHistory<'_> {
    fn amounts(&self) -> Vec<f64> {
        self.transactions.iter().map(Transaction::magnitude).collect()
    }

    fn current_cost(&self) -> f64 {
        self.transactions.last().map_or(0.0, Transaction::magnitude)
    }

    fn original_cost(&self) -> f64 {
        self.transactions.first().map_or(0.0, Transaction::magnitude)
    }

    /// Monthly spend from the billing cycle, the detected frequency, or the observed rate
    fn monthly_rate(&self) -> f64 {
        let current = self.current_cost();
        if let Some(cycle) = self.billing_cycle {
            return monthly_equivalent(current, cycle);
        }
        if let Some(per_month) = self
            .pattern
            .detected_frequency
            .and_then(|f| f.occurrences_per_month())
        {
            return stats::sanitize(current * per_month);
        }
        let span = self.statistics.time_span_days;
        if span > 0 {
            stats::sanitize(self.statistics.total_amount / (span as f64 / AVERAGE_MONTH_DAYS))
        } else {
            current
        }
    }
}

fn price_changes(transactions: &[Transaction]) -> Vec<PriceChange> {
    transactions
        .windows(2)
        .filter_map(|w| {
            let (previous, new) = (w[0].magnitude(), w[1].magnitude());
            if (new - previous).abs() < 0.01 {
                return None;
            }
            let change_percent = if previous > 0.0 {
                (new - previous) / previous * 100.0
            } else {
                100.0
            };
            Some(PriceChange {
                date: w[1].date,
                previous_amount: previous,
                new_amount: new,
                change_percent: stats::sanitize(change_percent),
            })
        })
        .collect()
}

pub fn analyze_costs(history: &ChargeHistory<'_>, config: &SubscriptionConfig, currency: &str) -> CostAnalysis {
    let current_cost = history.current_cost();
    let original_cost = history.original_cost();

    let increase = current_cost - original_cost;
    let increase_percent = if original_cost > 0.0 {
        increase / original_cost * 100.0
    } else {
        0.0
    };
    let price_increase_alert = increase > 0.0
        && (increase > config.price_increase_absolute
            || increase_percent > config.price_increase_percent);

    let monthly = history.monthly_rate();

    CostAnalysis {
        payee_id: history.payee_id,
        charge_count: history.transactions.len(),
        currency: currency.to_string(),
        billing_cycle: history.billing_cycle,
        current_cost,
        original_cost,
        average_cost: stats::mean(&history.amounts()),
        total_spent: stats::sanitize(history.amounts().iter().sum()),
        monthly_equivalent: monthly,
        annual_equivalent: stats::sanitize(monthly * 12.0),
        trend: history.statistics.trend_direction,
        trend_strength: history.statistics.trend_strength,
        price_changes: price_changes(history.transactions),
        price_increase_alert,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalPrediction {
    /// 1 = next renewal
    pub sequence: usize,
    pub date: NaiveDate,
    pub expected_cost: f64,
    pub confidence: f64,
}

/// Each renewal further out is this much less certain than the one before
const RENEWAL_CONFIDENCE_DECAY: f64 = 0.9;

/// Most renewals a single forecast will produce
pub const MAX_RENEWALS: usize = 120;

fn renewal_date(last_charge: NaiveDate, cycle: Option<BillingCycle>, average_days: f64, step: u32) -> Option<NaiveDate> {
    match cycle {
        Some(BillingCycle::Monthly) => last_charge.checked_add_months(Months::new(step)),
        Some(BillingCycle::Quarterly) => last_charge.checked_add_months(Months::new(3 * step)),
        Some(BillingCycle::Annual) => last_charge.checked_add_months(Months::new(12 * step)),
        Some(BillingCycle::Weekly) => Some(last_charge + Duration::days(7 * i64::from(step))),
        Some(BillingCycle::BiWeekly) => Some(last_charge + Duration::days(14 * i64::from(step))),
        None if average_days >= 1.0 => {
            Some(last_charge + Duration::days((average_days * f64::from(step)).round() as i64))
        }
        None => None,
    }
}

/// Forecast the next `count` renewals after the last charge
///
/// Empty unless the history is periodic. `count` is capped at [`MAX_RENEWALS`].
pub fn predict_renewals(history: &ChargeHistory<'_>, count: usize) -> Vec<RenewalPrediction> {
    let Some(last_charge) = history.transactions.last().map(|tx| tx.date) else {
        return Vec::new();
    };
    if history.billing_cycle.is_none() && !history.pattern.is_periodic() {
        return Vec::new();
    }

    let expected_cost = history.current_cost();
    let base = history.pattern.confidence;

    (1..=count.min(MAX_RENEWALS))
        .map_while(|sequence| {
            let step = u32::try_from(sequence).ok()?;
            let date = renewal_date(
                last_charge,
                history.billing_cycle,
                history.pattern.average_days_between,
                step,
            )?;
            Some(RenewalPrediction {
                sequence,
                date,
                expected_cost,
                confidence: stats::unit(base * RENEWAL_CONFIDENCE_DECAY.powi(step as i32 - 1)),
            })
        })
        .collect()
}

/// Usage and value scoring, every sub-score in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAnalysis {
    pub payee_id: i64,
    /// Regularity of the billing interval
    pub frequency_score: f64,
    /// Recent charges relative to what the interval predicts
    pub intensity_score: f64,
    /// Original price over current price
    pub value_score: f64,
    /// 1 while costs are flat or falling
    pub trend_score: f64,
    pub overall_score: f64,
    pub recent_charges: usize,
    pub expected_recent_charges: f64,
    pub summary: String,
}

const USAGE_WINDOW_DAYS: i64 = 90;

pub fn analyze_usage(history: &ChargeHistory<'_>, as_of: NaiveDate) -> UsageAnalysis {
    let pattern = history.pattern;
    let frequency_score = if pattern.detected_frequency.is_some() {
        pattern.regularity_score
    } else {
        0.0
    };

    let average = pattern.average_days_between;
    let window = USAGE_WINDOW_DAYS.max((average * 1.5).ceil() as i64);
    let since = as_of - Duration::days(window);
    let recent_charges = history
        .transactions
        .iter()
        .filter(|tx| tx.date > since && tx.date <= as_of)
        .count();
    let expected_recent_charges = if average > 0.0 {
        window as f64 / average
    } else {
        0.0
    };
    let intensity_score = if expected_recent_charges > 0.0 {
        stats::unit(recent_charges as f64 / expected_recent_charges)
    } else {
        0.0
    };

    let current = history.current_cost();
    let value_score = if current > 0.0 {
        stats::unit(history.original_cost() / current)
    } else {
        1.0
    };

    let trend_score = stats::unit(1.0 - history.statistics.signed_trend().max(0.0));

    let overall_score = stats::mean(&[frequency_score, intensity_score, value_score, trend_score]);
    let summary = match overall_score {
        s if s >= 0.7 => "Strong value: charged regularly at a stable price",
        s if s >= 0.4 => "Moderate value: some irregularity or price growth",
        _ => "Weak value: charges are sporadic or rising",
    }
    .to_string();

    UsageAnalysis {
        payee_id: history.payee_id,
        frequency_score,
        intensity_score,
        value_score,
        trend_score,
        overall_score,
        recent_charges,
        expected_recent_charges,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::intelligence::{FrequencyPatternDetector, SpendingPatternAnalyzer};

    fn monthly(amounts: &[f64]) -> Vec<Transaction> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let date = start.checked_add_months(Months::new(i as u32)).unwrap();
                Transaction::new(i as i64 + 1, 3, date, Some(-amount))
            })
            .collect()
    }

    fn run<T>(transactions: &[Transaction], cycle: Option<BillingCycle>, f: impl FnOnce(&ChargeHistory<'_>) -> T) -> T {
        let statistics = SpendingPatternAnalyzer::default().analyze(3, transactions);
        let pattern = FrequencyPatternDetector::default().detect(transactions);
        let history = ChargeHistory {
            payee_id: 3,
            transactions,
            statistics: &statistics,
            pattern: &pattern,
            billing_cycle: cycle,
        };
        f(&history)
    }

    #[test]
    fn test_monthly_equivalent() {
        assert_eq!(monthly_equivalent(10.0, BillingCycle::Monthly), 10.0);
        assert!((monthly_equivalent(120.0, BillingCycle::Annual) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_increase_detected() {
        let config = EngineConfig::default().subscriptions;
        let txs = monthly(&[15.49, 15.49, 15.49, 17.99, 17.99]);
        let costs = run(&txs, Some(BillingCycle::Monthly), |h| analyze_costs(h, &config, "USD"));

        assert_eq!(costs.current_cost, 17.99);
        assert_eq!(costs.original_cost, 15.49);
        assert!(costs.price_increase_alert);
        assert_eq!(costs.price_changes.len(), 1);
        assert_eq!(costs.price_changes[0].date, txs[3].date);
        assert!(costs.price_changes[0].change_percent > 16.0);
        assert_eq!(costs.monthly_equivalent, 17.99);
        assert!((costs.annual_equivalent - 17.99 * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_stable_price_has_no_alert() {
        let config = EngineConfig::default().subscriptions;
        let txs = monthly(&[9.99; 4]);
        let costs = run(&txs, None, |h| analyze_costs(h, &config, "EUR"));
        assert!(!costs.price_increase_alert);
        assert!(costs.price_changes.is_empty());
        assert_eq!(costs.currency, "EUR");
        assert!((costs.total_spent - 39.96).abs() < 1e-9);
    }

    #[test]
    fn test_renewals_follow_calendar_months() {
        let txs = monthly(&[9.99; 4]);
        let renewals = run(&txs, Some(BillingCycle::Monthly), |h| predict_renewals(h, 3));

        assert_eq!(renewals.len(), 3);
        assert_eq!(renewals[0].date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
        assert_eq!(renewals[2].date, NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
        assert!(renewals[0].confidence > renewals[1].confidence);
        assert!(renewals.iter().all(|r| r.expected_cost == 9.99));
    }

    #[test]
    fn test_no_renewals_without_a_pattern() {
        let txs = monthly(&[9.99]);
        assert!(run(&txs, None, |h| predict_renewals(h, 3)).is_empty());
        assert!(run(&[], None, |h| predict_renewals(h, 3)).is_empty());
    }

    #[test]
    fn test_renewal_count_is_capped() {
        let txs = monthly(&[9.99; 4]);
        let renewals = run(&txs, Some(BillingCycle::Monthly), |h| {
            predict_renewals(h, 1_000_000_000)
        });

        assert_eq!(renewals.len(), MAX_RENEWALS);
        assert_eq!(renewals.last().unwrap().sequence, MAX_RENEWALS);
        assert!(renewals.iter().all(|r| r.confidence.is_finite()));
    }

    #[test]
    fn test_single_charge_still_totals() {
        let config = EngineConfig::default().subscriptions;
        let txs = monthly(&[12.5]);
        let costs = run(&txs, None, |h| analyze_costs(h, &config, "USD"));
        assert_eq!(costs.charge_count, 1);
        assert_eq!(costs.total_spent, 12.5);
    }

    #[test]
    fn test_usage_scores_in_unit_range() {
        let txs = monthly(&[20.0; 6]);
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let usage = run(&txs, Some(BillingCycle::Monthly), |h| analyze_usage(h, as_of));

        for score in [
            usage.frequency_score,
            usage.intensity_score,
            usage.value_score,
            usage.trend_score,
            usage.overall_score,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }
        assert_eq!(usage.value_score, 1.0);
        assert_eq!(usage.trend_score, 1.0);
        assert!(usage.overall_score >= 0.7);
        assert!(usage.summary.starts_with("Strong"));
    }

    #[test]
    fn test_lapsed_charges_reduce_intensity() {
        let txs = monthly(&[20.0; 6]);
        let as_of = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let usage = run(&txs, Some(BillingCycle::Monthly), |h| analyze_usage(h, as_of));
        assert_eq!(usage.recent_charges, 0);
        assert_eq!(usage.intensity_score, 0.0);
    }
}
