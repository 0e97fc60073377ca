//! Subscription detection and classification
//!
//! Three independent signals vote on whether a payee is a subscription:
//! the payee name, the regularity of its billing interval, and how stable the
//! charged amount is.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{FrequencyConfig, SubscriptionConfig};
use crate::intelligence::{ConfidenceFactor, FrequencyPattern, FrequencyPatternDetector};
use crate::models::{
    BillingCycle, Frequency, Payee, SubscriptionMetadata, SubscriptionType, Transaction,
};
use crate::stats;

const NAME_WEIGHT: f64 = 0.3;
const FREQUENCY_WEIGHT: f64 = 0.4;
const AMOUNT_WEIGHT: f64 = 0.3;

/// Confidence of a known merchant name
const KNOWN_SERVICE_CONFIDENCE: f64 = 0.9;
/// Confidence of a generic subscription keyword
const GENERIC_KEYWORD_CONFIDENCE: f64 = 0.5;

/// Known merchants per subscription type, checked in order
static SERVICE_PATTERNS: LazyLock<Vec<(SubscriptionType, Regex)>> = LazyLock::new(|| {
    [
        (
            SubscriptionType::Entertainment,
            r"netflix|hulu|disney\+?|hbo|paramount|peacock|spotify|apple music|apple tv|tidal|pandora|youtube (?:premium|music|tv)|twitch|audible|crunchyroll|xbox|playstation|nintendo",
        ),
        (
            SubscriptionType::Membership,
            r"amazon prime|costco|sam'?s club|planet fitness|la fitness|24 hour fitness|ymca|aaa|gym",
        ),
        (
            SubscriptionType::Software,
            r"adobe|microsoft 365|office 365|github|dropbox|icloud|google one|onedrive|1password|lastpass|notion|slack|zoom|jetbrains|openai|chatgpt|canva",
        ),
        (
            SubscriptionType::Communication,
            r"verizon|at&t|t-mobile|comcast|xfinity|spectrum|cox communications|mint mobile|google fi|wireless",
        ),
        (
            SubscriptionType::Utilities,
            r"electric|water (?:utility|dept|department)|sewer|waste management|pg&e|con ?ed|energy|utility",
        ),
        (
            SubscriptionType::Finance,
            r"insurance|geico|progressive|state farm|allstate|ynab|quicken|credit monitoring",
        ),
        (
            SubscriptionType::Health,
            r"peloton|headspace|calm|noom|weight ?watchers|myfitnesspal|fitbit|strava",
        ),
        (
            SubscriptionType::Education,
            r"coursera|udemy|skillshare|masterclass|duolingo|linkedin learning|chegg|brilliant",
        ),
        (
            SubscriptionType::Shopping,
            r"hellofresh|blue apron|chewy|dollar shave|stitch fix|birchbox|ipsy",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        let re = Regex::new(&format!(r"(?i)\b(?:{})\b", pattern)).expect("valid regex");
        (kind, re)
    })
    .collect()
});

static GENERIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(subscription|subscr|membership|premium|monthly|annual|recurring|renewal|plus|pro)\b")
        .expect("valid regex")
});

/// Result of matching a payee name against the merchant heuristics
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub subscription_type: SubscriptionType,
    pub confidence: f64,
    pub keyword: String,
}

/// Match a payee name against known services, then generic keywords
pub fn match_name(name: &str) -> Option<NameMatch> {
    for (kind, re) in SERVICE_PATTERNS.iter() {
        if let Some(m) = re.find(name) {
            return Some(NameMatch {
                subscription_type: *kind,
                confidence: KNOWN_SERVICE_CONFIDENCE,
                keyword: m.as_str().to_lowercase(),
            });
        }
    }

    GENERIC_PATTERN.find(name).map(|m| {
        let keyword = m.as_str().to_lowercase();
        NameMatch {
            subscription_type: if keyword == "membership" {
                SubscriptionType::Membership
            } else {
                SubscriptionType::Other
            },
            confidence: GENERIC_KEYWORD_CONFIDENCE,
            keyword,
        }
    })
}

/// Which signal produced a detection method entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethodKind {
    NamePattern,
    Frequency,
    AmountConsistency,
}

impl DetectionMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NamePattern => "name_pattern",
            Self::Frequency => "frequency",
            Self::AmountConsistency => "amount_consistency",
        }
    }
}

impl std::fmt::Display for DetectionMethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMethod {
    pub method: DetectionMethodKind,
    pub confidence: f64,
    pub evidence: String,
}

/// Full classification of one payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionClassification {
    pub payee_id: i64,
    pub payee_name: String,
    pub detection_confidence: f64,
    pub subscription_type: SubscriptionType,
    pub billing_cycle: Option<BillingCycle>,
    /// Signals that fired, strongest first
    pub detection_methods: Vec<DetectionMethod>,
    pub suggested_metadata: SubscriptionMetadata,
    pub risk_factors: Vec<String>,
    /// Per-signal breakdown, including signals that did not fire
    pub confidence_factors: Vec<ConfidenceFactor>,
    pub transaction_count: usize,
}

#[derive(Debug, Clone)]
pub struct SubscriptionDetector {
    min_confidence: f64,
    regularity_threshold: f64,
    amount_cv_ceiling: f64,
    default_currency: String,
    frequency: FrequencyPatternDetector,
}

impl SubscriptionDetector {
    pub fn new(config: &SubscriptionConfig, frequency: &FrequencyConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            regularity_threshold: config.regularity_threshold,
            amount_cv_ceiling: config.amount_cv_ceiling,
            default_currency: config.default_currency.clone(),
            frequency: FrequencyPatternDetector::new(frequency),
        }
    }

    /// Detections below this are never surfaced
    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Billing-interval signal, 0 unless the pattern is periodic and regular enough
    fn frequency_signal(&self, pattern: &FrequencyPattern) -> f64 {
        let billable = pattern
            .detected_frequency
            .and_then(BillingCycle::from_frequency)
            .is_some();
        if billable && pattern.regularity_score >= self.regularity_threshold {
            pattern.confidence
        } else {
            0.0
        }
    }

    fn amount_signal(&self, amounts: &[f64]) -> (f64, f64) {
        if amounts.len() < 2 {
            return (0.0, 0.0);
        }
        let cv = stats::coefficient_of_variation(amounts);
        let ceiling = self.amount_cv_ceiling.max(f64::EPSILON);
        (stats::unit(1.0 - cv / ceiling), cv)
    }

    /// Classify `payee` from its expense history (ordered by date)
    pub fn classify(&self, payee: &Payee, transactions: &[Transaction]) -> SubscriptionClassification {
        let amounts: Vec<f64> = transactions.iter().map(Transaction::magnitude).collect();
        let pattern = self.frequency.detect(transactions);

        let name = match_name(&payee.name);
        let name_score = name.as_ref().map_or(0.0, |m| m.confidence);
        let frequency_score = self.frequency_signal(&pattern);
        let (amount_score, cv) = self.amount_signal(&amounts);

        let detection_confidence = stats::unit(
            NAME_WEIGHT * name_score + FREQUENCY_WEIGHT * frequency_score + AMOUNT_WEIGHT * amount_score,
        );

        let billing_cycle = if frequency_score > 0.0 {
            pattern.detected_frequency.and_then(BillingCycle::from_frequency)
        } else {
            None
        };
        let subscription_type = name
            .as_ref()
            .map_or(SubscriptionType::Other, |m| m.subscription_type);

        let mut detection_methods = Vec::new();
        if let Some(m) = &name {
            detection_methods.push(DetectionMethod {
                method: DetectionMethodKind::NamePattern,
                confidence: m.confidence,
                evidence: format!("Name matches '{}'", m.keyword),
            });
        }
        if frequency_score > 0.0 {
            detection_methods.push(DetectionMethod {
                method: DetectionMethodKind::Frequency,
                confidence: frequency_score,
                evidence: format!(
                    "Charged {} every {:.1} days (regularity {:.2})",
                    pattern
                        .detected_frequency
                        .map_or("irregularly", |f| f.as_str()),
                    pattern.average_days_between,
                    pattern.regularity_score
                ),
            });
        }
        if amount_score > 0.0 {
            detection_methods.push(DetectionMethod {
                method: DetectionMethodKind::AmountConsistency,
                confidence: amount_score,
                evidence: format!("Amounts vary by {:.1}%", cv * 100.0),
            });
        }
        detection_methods.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let confidence_factors = vec![
            ConfidenceFactor::new(
                "name_pattern",
                name_score,
                name.as_ref().map_or_else(
                    || "No subscription keyword in the name".to_string(),
                    |m| format!("Matched '{}'", m.keyword),
                ),
            ),
            ConfidenceFactor::new(
                "billing_regularity",
                frequency_score,
                format!("Interval regularity {:.2}", pattern.regularity_score),
            ),
            ConfidenceFactor::new(
                "amount_consistency",
                amount_score,
                format!("Coefficient of variation {:.3}", cv),
            ),
        ];

        let base_cost = base_cost(&amounts);

        SubscriptionClassification {
            payee_id: payee.id,
            payee_name: payee.name.clone(),
            detection_confidence,
            subscription_type,
            billing_cycle,
            detection_methods,
            suggested_metadata: SubscriptionMetadata {
                is_subscription: detection_confidence >= self.min_confidence,
                subscription_type,
                billing_cycle,
                base_cost,
                currency: self.default_currency.clone(),
                auto_renewal: billing_cycle.is_some(),
            },
            risk_factors: self.risk_factors(&pattern, &amounts, cv, base_cost),
            confidence_factors,
            transaction_count: transactions.len(),
        }
    }

    fn risk_factors(&self, pattern: &FrequencyPattern, amounts: &[f64], cv: f64, base_cost: f64) -> Vec<String> {
        let mut risks = Vec::new();
        if amounts.len() < 3 {
            risks.push(format!("Only {} charges observed", amounts.len()));
        }
        if cv > self.amount_cv_ceiling {
            risks.push(format!("Charge amounts vary by {:.0}%", cv * 100.0));
        }
        if pattern.detected_frequency == Some(Frequency::Irregular)
            || (pattern.is_periodic() && pattern.regularity_score < self.regularity_threshold)
        {
            risks.push("Billing interval is irregular".to_string());
        }
        if !pattern.irregular_patterns.unusual_gaps.is_empty() {
            risks.push(format!(
                "{} unusually long gap(s) between charges",
                pattern.irregular_patterns.unusual_gaps.len()
            ));
        }
        if let Some(&latest) = amounts.last() {
            if base_cost > 0.0 && latest > base_cost * 1.05 {
                risks.push(format!(
                    "Latest charge is {:.0}% above the typical amount",
                    (latest / base_cost - 1.0) * 100.0
                ));
            }
        }
        risks
    }
}

impl Default for SubscriptionDetector {
    fn default() -> Self {
        let config = crate::config::EngineConfig::default();
        Self::new(&config.subscriptions, &config.frequency)
    }
}

/// Typical charge: median of the last three amounts
pub fn base_cost(amounts: &[f64]) -> f64 {
    let recent = &amounts[amounts.len().saturating_sub(3)..];
    stats::median(recent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, NaiveDate, Utc};

    fn payee(name: &str) -> Payee {
        Payee {
            id: 7,
            name: name.into(),
            default_category_id: None,
            is_subscription: false,
            subscription: None,
            created_at: Utc::now(),
        }
    }

    fn monthly(count: u32, amount: f64) -> Vec<Transaction> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                let date = start.checked_add_months(Months::new(i)).unwrap();
                Transaction::new(i as i64 + 1, 7, date, Some(-amount))
            })
            .collect()
    }

    #[test]
    fn test_match_name_known_service() {
        let m = match_name("NETFLIX.COM").unwrap();
        assert_eq!(m.subscription_type, SubscriptionType::Entertainment);
        assert_eq!(m.confidence, KNOWN_SERVICE_CONFIDENCE);
        assert_eq!(m.keyword, "netflix");

        let m = match_name("Amazon Prime*2K4").unwrap();
        assert_eq!(m.subscription_type, SubscriptionType::Membership);
    }

    #[test]
    fn test_match_name_generic_keyword() {
        let m = match_name("Acme Premium").unwrap();
        assert_eq!(m.subscription_type, SubscriptionType::Other);
        assert_eq!(m.confidence, GENERIC_KEYWORD_CONFIDENCE);

        assert!(match_name("Corner Cafe").is_none());
        // word boundaries
        assert!(match_name("Calmont Bakery").is_none());
    }

    #[test]
    fn test_netflix_monthly_is_entertainment() {
        let detector = SubscriptionDetector::default();
        let result = detector.classify(&payee("Netflix"), &monthly(6, 15.99));

        assert!(result.detection_confidence > 0.3);
        assert_eq!(result.subscription_type, SubscriptionType::Entertainment);
        assert_eq!(result.billing_cycle, Some(BillingCycle::Monthly));
        assert!((result.suggested_metadata.base_cost - 15.99).abs() < 1e-9);
        assert!(result.suggested_metadata.is_subscription);
        assert!(result.suggested_metadata.auto_renewal);
        assert_eq!(result.detection_methods.len(), 3);
        assert!(result.risk_factors.is_empty());
    }

    #[test]
    fn test_unknown_name_still_detected_from_pattern() {
        let detector = SubscriptionDetector::default();
        let result = detector.classify(&payee("Village Water Co-op"), &monthly(8, 42.0));
        assert_eq!(result.subscription_type, SubscriptionType::Other);
        assert!(result.detection_confidence > 0.3);
        assert!(result
            .detection_methods
            .iter()
            .all(|m| m.method != DetectionMethodKind::NamePattern));
    }

    #[test]
    fn test_single_charge_is_not_a_subscription() {
        let detector = SubscriptionDetector::default();
        let result = detector.classify(&payee("Hardware Store"), &monthly(1, 80.0));
        assert_eq!(result.detection_confidence, 0.0);
        assert!(!result.suggested_metadata.is_subscription);
        assert_eq!(result.billing_cycle, None);
        assert!(result.risk_factors[0].contains("Only 1"));
    }

    #[test]
    fn test_variable_amounts_lower_confidence() {
        let detector = SubscriptionDetector::default();
        let steady = detector.classify(&payee("Gym Co"), &monthly(6, 30.0));

        let mut varied = monthly(6, 30.0);
        for (i, tx) in varied.iter_mut().enumerate() {
            tx.amount = -(10.0 + 25.0 * i as f64);
        }
        let noisy = detector.classify(&payee("Gym Co"), &varied);

        assert!(noisy.detection_confidence < steady.detection_confidence);
        assert!(noisy
            .risk_factors
            .iter()
            .any(|r| r.starts_with("Charge amounts vary")));
    }

    #[test]
    fn test_base_cost_uses_recent_charges() {
        assert_eq!(base_cost(&[]), 0.0);
        assert_eq!(base_cost(&[10.0, 10.0, 12.0, 12.0, 12.0]), 12.0);
    }
}
