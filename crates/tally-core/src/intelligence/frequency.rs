//! Frequency Pattern Detector
//!
//! Infers the recurrence interval of a payee's transactions from the day gaps
//! between consecutive dates, and flags irregularities (unusual gaps, bursts
//! of short intervals, long seasonal breaks).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::FrequencyConfig;
use crate::models::{Frequency, Transaction};
use crate::stats;

/// A run of transactions much closer together than usual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCluster {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub transaction_count: usize,
}

/// A gap more than twice the average interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusualGap {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub days: i64,
    pub ratio_to_average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrregularPatterns {
    pub clusters: Vec<TransactionCluster>,
    pub has_seasonal_breaks: bool,
    pub unusual_gaps: Vec<UnusualGap>,
}

/// Detected recurrence for one payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPattern {
    /// `None` when there are fewer than two transactions
    pub detected_frequency: Option<Frequency>,
    pub average_days_between: f64,
    pub median_days_between: f64,
    pub standard_deviation_days: f64,
    pub regularity_score: f64,
    pub predictability_score: f64,
    /// Confidence in the frequency label
    pub confidence: f64,
    pub intervals: Vec<i64>,
    pub irregular_patterns: IrregularPatterns,
}

impl FrequencyPattern {
    pub fn insufficient() -> Self {
        Self {
            detected_frequency: None,
            average_days_between: 0.0,
            median_days_between: 0.0,
            standard_deviation_days: 0.0,
            regularity_score: 0.0,
            predictability_score: 0.0,
            confidence: 0.0,
            intervals: Vec::new(),
            irregular_patterns: IrregularPatterns::default(),
        }
    }

    /// Whether the label is a periodic frequency (not irregular, not missing)
    pub fn is_periodic(&self) -> bool {
        matches!(self.detected_frequency, Some(f) if f != Frequency::Irregular)
    }
}

// Gaps of at least this many days (and 3x the average) count as a seasonal break
const SEASONAL_BREAK_MIN_DAYS: i64 = 45;

#[derive(Debug, Clone)]
pub struct FrequencyPatternDetector {
    tolerance: f64,
}

impl FrequencyPatternDetector {
    pub fn new(config: &FrequencyConfig) -> Self {
        Self {
            tolerance: config.tolerance,
        }
    }

    pub fn detect(&self, transactions: &[Transaction]) -> FrequencyPattern {
        let dates: Vec<NaiveDate> = transactions.iter().map(|tx| tx.date).collect();
        self.detect_dates(&dates)
    }

    pub fn detect_dates(&self, dates: &[NaiveDate]) -> FrequencyPattern {
        if dates.len() < 2 {
            return FrequencyPattern::insufficient();
        }

        let mut dates = dates.to_vec();
        dates.sort();

        let intervals: Vec<i64> = dates.windows(2).map(|w| (w[1] - w[0]).num_days()).collect();
        let gaps: Vec<f64> = intervals.iter().map(|d| *d as f64).collect();

        let average = stats::mean(&gaps);
        let std_dev = stats::standard_deviation(&gaps, average);
        let regularity = if average > 0.0 {
            1.0 - (std_dev / average).min(1.0)
        } else {
            0.0
        };

        let frequency = self.classify_interval(average);
        let samples = intervals.len() as f64;
        let sample_factor = samples / (samples + 2.0);

        let (confidence, predictability) = match frequency.canonical_days() {
            Some(canonical) => {
                let closeness = 1.0 - ((average - canonical).abs() / canonical).min(1.0);
                (regularity * sample_factor, regularity * closeness)
            }
            None => (regularity * sample_factor * 0.5, regularity * 0.5),
        };

        let irregular_patterns = irregular_patterns(&dates, &intervals, average);

        tracing::debug!(
            frequency = %frequency,
            average_days = average,
            regularity,
            "Detected frequency pattern"
        );

        FrequencyPattern {
            detected_frequency: Some(frequency),
            average_days_between: average,
            median_days_between: stats::median(&gaps),
            standard_deviation_days: std_dev,
            regularity_score: stats::unit(regularity),
            predictability_score: stats::unit(predictability),
            confidence: stats::unit(confidence),
            intervals,
            irregular_patterns,
        }
    }

    /// Nearest canonical interval within the tolerance band, else irregular
    pub fn classify_interval(&self, average_days: f64) -> Frequency {
        if !average_days.is_finite() || average_days <= 0.0 {
            return Frequency::Irregular;
        }

        Frequency::CANONICAL
            .iter()
            .filter_map(|f| f.canonical_days().map(|days| (*f, days)))
            .filter(|(_, days)| {
                // Half a day of slack keeps daily habits from falling out of the band
                (average_days - days).abs() <= (self.tolerance * days).max(0.5)
            })
            .min_by(|(_, a), (_, b)| {
                let da = (average_days - a).abs() / a;
                let db = (average_days - b).abs() / b;
                da.total_cmp(&db)
            })
            .map(|(f, _)| f)
            .unwrap_or(Frequency::Irregular)
    }
}

impl Default for FrequencyPatternDetector {
    fn default() -> Self {
        Self { tolerance: 0.25 }
    }
}

fn irregular_patterns(dates: &[NaiveDate], intervals: &[i64], average: f64) -> IrregularPatterns {
    let mut patterns = IrregularPatterns::default();
    if average <= 0.0 {
        return patterns;
    }

    for (i, days) in intervals.iter().enumerate() {
        let ratio = *days as f64 / average;
        if ratio > 2.0 {
            patterns.unusual_gaps.push(UnusualGap {
                from_date: dates[i],
                to_date: dates[i + 1],
                days: *days,
                ratio_to_average: ratio,
            });
        }
        if ratio >= 3.0 && *days >= SEASONAL_BREAK_MIN_DAYS {
            patterns.has_seasonal_breaks = true;
        }
    }

    // Contiguous runs of intervals under half the average
    let mut run_start: Option<usize> = None;
    for i in 0..=intervals.len() {
        let short = intervals
            .get(i)
            .is_some_and(|days| (*days as f64) < average * 0.5);
        match (short, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                patterns.clusters.push(TransactionCluster {
                    start_date: dates[start],
                    end_date: dates[i],
                    transaction_count: i - start + 1,
                });
                run_start = None;
            }
            _ => {}
        }
    }

    patterns
}
