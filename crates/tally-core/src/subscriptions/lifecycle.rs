//! Subscription lifecycle tracking
//!
//! The recorded lifecycle log wins when it has entries. Otherwise the status is
//! inferred from the charge history: regular charges mean active, a stop past
//! the expected next charge (plus grace) means cancelled.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::costs::{CostAnalysis, UsageAnalysis};
use crate::intelligence::FrequencyPattern;
use crate::models::{LifecycleEvent, SubscriptionStatus, Transaction};
use crate::stats;

/// Where the current status came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Recorded,
    Inferred,
}

/// Recommendation on whether the subscription is worth its price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueAssessment {
    Keep,
    Downgrade,
    Cancel,
    Review,
}

impl ValueAssessment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Downgrade => "downgrade",
            Self::Cancel => "cancel",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for ValueAssessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleAnalysis {
    pub payee_id: i64,
    /// None when there is neither a lifecycle log nor a charge history
    pub current_status: Option<SubscriptionStatus>,
    pub status_source: StatusSource,
    pub status_since: Option<NaiveDate>,
    pub last_charge_date: Option<NaiveDate>,
    pub expected_next_charge: Option<NaiveDate>,
    pub days_overdue: i64,
    pub cancellation_probability: f64,
    pub assessment: ValueAssessment,
    pub reasons: Vec<String>,
    pub events: Vec<LifecycleEvent>,
}

pub struct LifecycleInput<'a> {
    pub payee_id: i64,
    pub events: &'a [LifecycleEvent],
    /// Expenses ordered by date
    pub transactions: &'a [Transaction],
    pub pattern: &'a FrequencyPattern,
    pub costs: &'a CostAnalysis,
    pub usage: &'a UsageAnalysis,
    pub as_of: NaiveDate,
}

/// Fewer charges than this always ends in a review
const MIN_CHARGES_FOR_ASSESSMENT: usize = 3;

#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    grace_days: i64,
}

impl LifecycleTracker {
    pub fn new(grace_days: i64) -> Self {
        Self {
            grace_days: grace_days.max(0),
        }
    }

    /// Grace period past the expected charge, scaled up for long cycles
    pub fn grace_for(&self, average_days: f64) -> i64 {
        self.grace_days.max((average_days * 0.25).ceil() as i64)
    }

    pub fn analyze(&self, input: &LifecycleInput<'_>) -> LifecycleAnalysis {
        let mut reasons = Vec::new();
        let last_charge_date = input.transactions.last().map(|tx| tx.date);

        let expected_next_charge = match last_charge_date {
            Some(last) if input.pattern.is_periodic() => {
                Some(last + Duration::days(input.pattern.average_days_between.round() as i64))
            }
            _ => None,
        };
        let days_overdue = expected_next_charge
            .map_or(0, |expected| (input.as_of - expected).num_days().max(0));
        let grace = self.grace_for(input.pattern.average_days_between);

        let latest_event = input
            .events
            .iter()
            .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let (current_status, status_source, status_since) = match latest_event {
            Some(event)
                if !event.status.is_billing()
                    && last_charge_date.is_some_and(|last| last > event.date) =>
            {
                reasons.push(format!(
                    "Charges resumed after it was marked {} on {}",
                    event.status, event.date
                ));
                (
                    Some(SubscriptionStatus::Active),
                    StatusSource::Inferred,
                    input
                        .transactions
                        .iter()
                        .find(|tx| tx.date > event.date)
                        .map(|tx| tx.date),
                )
            }
            Some(event) => {
                reasons.push(format!("Marked {} on {}", event.status, event.date));
                (Some(event.status), StatusSource::Recorded, Some(event.date))
            }
            None => match (last_charge_date, expected_next_charge) {
                (None, _) => {
                    reasons.push("No lifecycle events or charges".to_string());
                    (None, StatusSource::Inferred, None)
                }
                (Some(last), Some(_)) if days_overdue > grace => {
                    reasons.push(format!(
                        "No charge for {} days past the expected date",
                        days_overdue
                    ));
                    (Some(SubscriptionStatus::Cancelled), StatusSource::Inferred, Some(last))
                }
                (Some(_), Some(_)) => {
                    reasons.push("Charges continue on schedule".to_string());
                    (
                        Some(SubscriptionStatus::Active),
                        StatusSource::Inferred,
                        input.transactions.first().map(|tx| tx.date),
                    )
                }
                (Some(_), None) => {
                    reasons.push("Charges have no regular schedule".to_string());
                    (
                        Some(SubscriptionStatus::Active),
                        StatusSource::Inferred,
                        input.transactions.first().map(|tx| tx.date),
                    )
                }
            },
        };

        let cancellation_probability =
            self.cancellation_probability(current_status, days_overdue, grace, input.usage);
        let assessment = assess(current_status, input, &mut reasons);

        LifecycleAnalysis {
            payee_id: input.payee_id,
            current_status,
            status_source,
            status_since,
            last_charge_date,
            expected_next_charge,
            days_overdue,
            cancellation_probability,
            assessment,
            reasons,
            events: input.events.to_vec(),
        }
    }

    fn cancellation_probability(
        &self,
        status: Option<SubscriptionStatus>,
        days_overdue: i64,
        grace: i64,
        usage: &UsageAnalysis,
    ) -> f64 {
        let probability = match status {
            None => 0.5,
            Some(SubscriptionStatus::Cancelled | SubscriptionStatus::Expired) => 1.0,
            Some(SubscriptionStatus::PendingCancellation) => 0.9,
            Some(SubscriptionStatus::Paused) => 0.6,
            Some(SubscriptionStatus::Trial) => 0.5,
            Some(SubscriptionStatus::Active) => {
                let overdue = if grace > 0 {
                    days_overdue as f64 / grace as f64
                } else if days_overdue > 0 {
                    1.0
                } else {
                    0.0
                };
                0.05 + 0.5 * stats::unit(overdue) + 0.25 * (1.0 - usage.overall_score)
            }
        };
        stats::unit(probability)
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new(7)
    }
}

fn assess(
    status: Option<SubscriptionStatus>,
    input: &LifecycleInput<'_>,
    reasons: &mut Vec<String>,
) -> ValueAssessment {
    let Some(status) = status.filter(SubscriptionStatus::is_billing) else {
        reasons.push("Not currently billing".to_string());
        return ValueAssessment::Review;
    };
    if input.transactions.len() < MIN_CHARGES_FOR_ASSESSMENT {
        reasons.push(format!(
            "Only {} charges while {}",
            input.transactions.len(),
            status
        ));
        return ValueAssessment::Review;
    }

    let usage = input.usage.overall_score;
    if usage < 0.4 {
        reasons.push(format!("Usage score {:.2} is low", usage));
        ValueAssessment::Cancel
    } else if input.costs.price_increase_alert {
        reasons.push(format!(
            "Price rose from {:.2} to {:.2}",
            input.costs.original_cost, input.costs.current_cost
        ));
        ValueAssessment::Downgrade
    } else if usage < 0.7 {
        reasons.push(format!("Usage score {:.2} is middling", usage));
        ValueAssessment::Downgrade
    } else {
        ValueAssessment::Keep
    }
}
