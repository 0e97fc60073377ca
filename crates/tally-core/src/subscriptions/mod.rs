//! Subscription Engine
//!
//! Detects recurring charges, classifies them, and follows each subscription
//! through its lifecycle:
//!
//! - **detect** - name, interval and amount signals combined into one confidence
//! - **lifecycle** - recorded or inferred status, cancellation risk, value assessment
//! - **costs** - price history, renewals and usage scoring
//!
//! Only expenses feed the engine: income and transfers are filtered out at the
//! [`TransactionSource`] boundary.

pub mod costs;
pub mod detect;
pub mod lifecycle;

pub use costs::{
    monthly_equivalent, ChargeHistory, CostAnalysis, PriceChange, RenewalPrediction, UsageAnalysis,
    MAX_RENEWALS,
};
pub use detect::{
    match_name, DetectionMethod, DetectionMethodKind, NameMatch, SubscriptionClassification,
    SubscriptionDetector,
};
pub use lifecycle::{
    LifecycleAnalysis, LifecycleInput, LifecycleTracker, StatusSource, ValueAssessment,
};

use chrono::{NaiveDate, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::{EngineConfig, SubscriptionConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::intelligence::{
    FrequencyPattern, FrequencyPatternDetector, SpendingPatternAnalyzer, SpendingStatistics,
};
use crate::models::{
    AmountSign, BillingCycle, IntelligenceFilters, NewLifecycleEvent, Payee, Transaction,
};
use crate::sources::{LifecycleStore, PayeeSource, TransactionSource};

/// Everything derived from one payee's charge history
struct Charges {
    payee: Payee,
    transactions: Vec<Transaction>,
    statistics: SpendingStatistics,
    pattern: FrequencyPattern,
}

impl Charges {
    /// Confirmed billing cycle, else the one implied by the detected frequency
    fn billing_cycle(&self) -> Option<BillingCycle> {
        self.payee
            .subscription
            .as_ref()
            .and_then(|s| s.billing_cycle)
            .or_else(|| {
                self.pattern
                    .detected_frequency
                    .and_then(BillingCycle::from_frequency)
            })
    }

    fn history(&self) -> ChargeHistory<'_> {
        ChargeHistory {
            payee_id: self.payee.id,
            transactions: &self.transactions,
            statistics: &self.statistics,
            pattern: &self.pattern,
            billing_cycle: self.billing_cycle(),
        }
    }
}

pub struct SubscriptionEngine<'a> {
    payees: &'a dyn PayeeSource,
    transactions: &'a dyn TransactionSource,
    lifecycle: &'a dyn LifecycleStore,
    detector: SubscriptionDetector,
    spending: SpendingPatternAnalyzer,
    frequency: FrequencyPatternDetector,
    tracker: LifecycleTracker,
    config: SubscriptionConfig,
    as_of: Option<NaiveDate>,
}

impl<'a> SubscriptionEngine<'a> {
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self::with_sources(db, db, db, config)
    }

    pub fn with_sources(
        payees: &'a dyn PayeeSource,
        transactions: &'a dyn TransactionSource,
        lifecycle: &'a dyn LifecycleStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            payees,
            transactions,
            lifecycle,
            detector: SubscriptionDetector::new(&config.subscriptions, &config.frequency),
            spending: SpendingPatternAnalyzer::new(&config.spending),
            frequency: FrequencyPatternDetector::new(&config.frequency),
            tracker: LifecycleTracker::new(config.subscriptions.grace_days),
            config: config.subscriptions.clone(),
            as_of: None,
        }
    }

    /// Evaluate against a fixed date instead of today
    pub fn at(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Expenses only, transfers excluded, whole history
    fn expense_filters() -> IntelligenceFilters {
        IntelligenceFilters {
            amount_sign: AmountSign::Negative,
            exclude_transfers: true,
            ..Default::default()
        }
    }

    fn expenses(&self, payee_id: i64) -> Result<Vec<Transaction>> {
        self.transactions
            .query(payee_id, &Self::expense_filters(), self.as_of())
    }

    fn require_payee(&self, payee_id: i64) -> Result<Payee> {
        self.payees
            .payee(payee_id)?
            .ok_or_else(|| Error::NotFound(format!("payee {}", payee_id)))
    }

    fn charges(&self, payee_id: i64) -> Result<Charges> {
        let payee = self.require_payee(payee_id)?;
        let transactions = self.expenses(payee_id)?;
        let statistics = self.spending.analyze(payee_id, &transactions);
        let pattern = self.frequency.detect(&transactions);
        Ok(Charges {
            payee,
            transactions,
            statistics,
            pattern,
        })
    }

    fn currency(&self, payee: &Payee) -> String {
        payee
            .subscription
            .as_ref()
            .map_or_else(|| self.config.default_currency.clone(), |s| s.currency.clone())
    }

    /// Classify each payee not already flagged, keeping confident detections
    ///
    /// Strongest detections first.
    pub fn detect_subscriptions(&self, payees: &[Payee]) -> Result<Vec<SubscriptionClassification>> {
        let mut detected = Vec::new();
        for payee in payees.iter().filter(|p| !p.is_subscription) {
            let transactions = self.expenses(payee.id)?;
            let classification = self.detector.classify(payee, &transactions);
            if classification.detection_confidence >= self.detector.min_confidence() {
                detected.push(classification);
            } else {
                debug!(
                    payee_id = payee.id,
                    confidence = classification.detection_confidence,
                    "Below subscription threshold"
                );
            }
        }
        sort_detections(&mut detected);
        Ok(detected)
    }

    /// Batch scan over every payee, one task per payee
    ///
    /// Dropping the future aborts the outstanding tasks.
    pub async fn scan_subscriptions(&self) -> Result<Vec<SubscriptionClassification>> {
        let payees = self.payees.list_payees()?;
        let mut tasks = JoinSet::new();

        for payee in payees.into_iter().filter(|p| !p.is_subscription) {
            let transactions = self.expenses(payee.id)?;
            let detector = self.detector.clone();
            tasks.spawn(async move { detector.classify(&payee, &transactions) });
        }

        let mut detected = Vec::new();
        while let Some(result) = tasks.join_next().await {
            let classification = result?;
            if classification.detection_confidence >= self.detector.min_confidence() {
                detected.push(classification);
            }
        }
        sort_detections(&mut detected);

        info!(detected = detected.len(), "Subscription scan complete");
        Ok(detected)
    }

    /// Classify one payee, optionally from caller-supplied transactions
    ///
    /// Unlike detection this never filters by confidence.
    pub fn classify_subscription(
        &self,
        payee_id: i64,
        transactions: Option<&[Transaction]>,
    ) -> Result<SubscriptionClassification> {
        let payee = self.require_payee(payee_id)?;
        let classification = match transactions {
            Some(transactions) => {
                let mut sorted = transactions.to_vec();
                sorted.sort_by_key(|tx| tx.date);
                self.detector.classify(&payee, &sorted)
            }
            None => self.detector.classify(&payee, &self.expenses(payee_id)?),
        };
        Ok(classification)
    }

    /// Append a status change to the lifecycle log
    pub fn record_lifecycle_event(&self, event: &NewLifecycleEvent) -> Result<i64> {
        self.require_payee(event.payee_id)?;
        let id = self.lifecycle.append_event(event)?;
        info!(
            payee_id = event.payee_id,
            status = %event.status,
            "Recorded lifecycle event"
        );
        Ok(id)
    }

    pub fn track_subscription_lifecycle(&self, payee_id: i64) -> Result<LifecycleAnalysis> {
        let charges = self.charges(payee_id)?;
        let events = self.lifecycle.events(payee_id)?;
        let as_of = self.as_of();

        let history = charges.history();
        let costs = costs::analyze_costs(&history, &self.config, &self.currency(&charges.payee));
        let usage = costs::analyze_usage(&history, as_of);

        Ok(self.tracker.analyze(&LifecycleInput {
            payee_id,
            events: &events,
            transactions: &charges.transactions,
            pattern: &charges.pattern,
            costs: &costs,
            usage: &usage,
            as_of,
        }))
    }

    pub fn analyze_costs(&self, payee_id: i64) -> Result<CostAnalysis> {
        let charges = self.charges(payee_id)?;
        Ok(costs::analyze_costs(
            &charges.history(),
            &self.config,
            &self.currency(&charges.payee),
        ))
    }

    /// Forecast upcoming renewals; empty once the subscription stopped billing
    pub fn predict_renewals(&self, payee_id: i64, count: usize) -> Result<Vec<RenewalPrediction>> {
        let lifecycle = self.track_subscription_lifecycle(payee_id)?;
        if !lifecycle
            .current_status
            .is_some_and(|status| status.is_billing())
        {
            debug!(payee_id, "No renewals for a subscription that is not billing");
            return Ok(Vec::new());
        }

        let charges = self.charges(payee_id)?;
        Ok(costs::predict_renewals(&charges.history(), count))
    }

    pub fn analyze_usage(&self, payee_id: i64) -> Result<UsageAnalysis> {
        let charges = self.charges(payee_id)?;
        Ok(costs::analyze_usage(&charges.history(), self.as_of()))
    }
}

fn sort_detections(detected: &mut [SubscriptionClassification]) {
    detected.sort_by(|a, b| {
        b.detection_confidence
            .total_cmp(&a.detection_confidence)
            .then(a.payee_id.cmp(&b.payee_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransaction, SubscriptionStatus, SubscriptionType};
    use chrono::Months;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_monthly(db: &Database, name: &str, amount: f64, months: u32) -> i64 {
        let payee_id = db.create_payee(name).unwrap();
        for i in 0..months {
            db.insert_transaction(&NewTransaction {
                payee_id,
                date: date(2024, 1, 5).checked_add_months(Months::new(i)).unwrap(),
                amount: Some(-amount),
                category_id: None,
                is_transfer: false,
            })
            .unwrap();
        }
        payee_id
    }

    #[test]
    fn test_detect_netflix() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let netflix = seed_monthly(&db, "Netflix", 15.99, 6);
        seed_monthly(&db, "Corner Cafe", 0.0, 0);

        let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 6, 20));
        let payees = db.list_payees().unwrap();
        let detected = engine.detect_subscriptions(&payees).unwrap();

        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].payee_id, netflix);
        assert!(detected[0].detection_confidence > 0.3);
        assert_eq!(detected[0].subscription_type, SubscriptionType::Entertainment);
    }

    #[test]
    fn test_flagged_payees_are_skipped() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let spotify = seed_monthly(&db, "Spotify", 10.99, 6);
        db.mark_subscription(spotify, None).unwrap();

        let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 6, 20));
        let detected = engine.detect_subscriptions(&db.list_payees().unwrap()).unwrap();
        assert!(detected.is_empty());
    }

    #[tokio::test]
    async fn test_scan_matches_detect() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        seed_monthly(&db, "Netflix", 15.99, 6);
        seed_monthly(&db, "Adobe Creative Cloud", 54.99, 4);
        seed_monthly(&db, "Hardware Store", 80.0, 1);

        let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 6, 20));
        let scanned = engine.scan_subscriptions().await.unwrap();
        let detected = engine.detect_subscriptions(&db.list_payees().unwrap()).unwrap();
        assert_eq!(scanned, detected);
        assert_eq!(scanned.len(), 2);
    }

    #[test]
    fn test_unknown_payee_not_found() {
        let db = Database::in_memory().unwrap();
        let engine = SubscriptionEngine::new(&db, &EngineConfig::default());
        assert!(engine.classify_subscription(99, None).unwrap_err().is_not_found());
        assert!(engine
            .record_lifecycle_event(&NewLifecycleEvent {
                payee_id: 99,
                status: SubscriptionStatus::Active,
                date: date(2024, 1, 1),
                note: None,
            })
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_lifecycle_event_stops_renewals() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let payee_id = seed_monthly(&db, "Hulu", 7.99, 5);
        let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 5, 20));

        let renewals = engine.predict_renewals(payee_id, 2).unwrap();
        assert_eq!(renewals.len(), 2);
        assert_eq!(renewals[0].date, date(2024, 6, 5));

        engine
            .record_lifecycle_event(&NewLifecycleEvent {
                payee_id,
                status: SubscriptionStatus::Cancelled,
                date: date(2024, 5, 18),
                note: Some("cancelled online".into()),
            })
            .unwrap();

        let lifecycle = engine.track_subscription_lifecycle(payee_id).unwrap();
        assert_eq!(lifecycle.current_status, Some(SubscriptionStatus::Cancelled));
        assert_eq!(lifecycle.status_source, StatusSource::Recorded);
        assert!(engine.predict_renewals(payee_id, 2).unwrap().is_empty());
    }

    #[test]
    fn test_classify_with_supplied_transactions() {
        let db = Database::in_memory().unwrap();
        let payee_id = db.create_payee("Duolingo").unwrap();
        let engine = SubscriptionEngine::new(&db, &EngineConfig::default());

        let txs: Vec<Transaction> = (0..4)
            .rev()
            .map(|i| {
                let d = date(2023, 1, 1).checked_add_months(Months::new(12 * i)).unwrap();
                Transaction::new(i as i64, payee_id, d, Some(-59.99))
            })
            .collect();
        let result = engine.classify_subscription(payee_id, Some(&txs)).unwrap();
        assert_eq!(result.subscription_type, SubscriptionType::Education);
        assert_eq!(result.billing_cycle, Some(BillingCycle::Annual));
    }
}
