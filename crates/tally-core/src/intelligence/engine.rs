//! Intelligence service
//!
//! Composes the analyzers into one per-payee call: resolve the profile, pull
//! filtered transactions, analyze, predict, score, and return an immutable
//! snapshot. Callers diff snapshots with [`ReportDelta::between`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, AIClient, PredictionContext};
use crate::config::{EngineConfig, PredictionTier};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    IntelligenceProfile, NewPredictionFeedback, Payee, PredictionFeedback,
    PredictionMethodSetting, Transaction,
};
use crate::sources::{FeedbackStore, PayeeSource, ProfileStore, TransactionSource};
use crate::stats;

use super::confidence::{ConfidenceScore, ConfidenceScorer};
use super::frequency::{FrequencyPattern, FrequencyPatternDetector};
use super::prediction::{
    BudgetSuggestion, BudgetSuggestionEngine, NextTransactionPrediction, NextTransactionPredictor,
    PredictionInput, PredictionMethod,
};
use super::seasonality::{SeasonalProfile, SeasonalityDetector};
use super::spending::{SpendingPatternAnalyzer, SpendingStatistics};

/// Number of recent amounts shown to the language model
const AI_CONTEXT_AMOUNTS: usize = 12;

/// The analyzers, built once from config
#[derive(Debug, Clone)]
pub struct Analyzers {
    pub spending: SpendingPatternAnalyzer,
    pub frequency: FrequencyPatternDetector,
    pub seasonality: SeasonalityDetector,
    pub predictor: NextTransactionPredictor,
    pub budget: BudgetSuggestionEngine,
    pub confidence: ConfidenceScorer,
}

impl Analyzers {
    pub fn from_config(config: &EngineConfig) -> Self {
        let predictor = NextTransactionPredictor::new(&config.prediction);
        Self {
            spending: SpendingPatternAnalyzer::new(&config.spending),
            frequency: FrequencyPatternDetector::new(&config.frequency),
            seasonality: SeasonalityDetector::new(&config.seasonality),
            budget: BudgetSuggestionEngine::new(predictor.clone(), config.seasonality.min_months),
            predictor,
            confidence: ConfidenceScorer::new(&config.confidence),
        }
    }

    /// Pure local computation of a report (statistical / ml tiers only)
    pub fn report(
        &self,
        payee: &Payee,
        profile: &IntelligenceProfile,
        transactions: &[Transaction],
        feedback: &[PredictionFeedback],
        as_of: NaiveDate,
        tier: PredictionTier,
    ) -> PayeeIntelligenceReport {
        let statistics = self.spending.analyze(payee.id, transactions);
        let frequency = self.frequency.detect(transactions);
        let seasonality = self.seasonality.analyze(transactions);
        let confidence = self.confidence.score(&statistics, &frequency, feedback);

        let input = PredictionInput {
            transactions,
            statistics: &statistics,
            frequency: &frequency,
            seasonality: &seasonality,
        };
        let next_transaction = self.predictor.predict(&input, tier);
        let budget = self
            .budget
            .suggest(&input, tier, upcoming_month(as_of), confidence.overall);

        debug!(
            payee_id = payee.id,
            transactions = transactions.len(),
            tier = %tier,
            method = %next_transaction.method,
            confidence = confidence.overall,
            "Computed payee intelligence"
        );

        let meets_threshold = confidence.overall >= profile.confidence_threshold.unwrap_or(0.0);

        PayeeIntelligenceReport {
            payee_id: payee.id,
            payee_name: payee.name.clone(),
            as_of,
            computed_at: Utc::now(),
            profile: profile.clone(),
            tier,
            statistics,
            frequency,
            seasonality,
            next_transaction,
            budget,
            confidence,
            meets_threshold,
        }
    }
}

impl Default for Analyzers {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Immutable per-payee snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayeeIntelligenceReport {
    pub payee_id: i64,
    pub payee_name: String,
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub profile: IntelligenceProfile,
    /// Tier requested for this payee
    pub tier: PredictionTier,
    pub statistics: SpendingStatistics,
    pub frequency: FrequencyPattern,
    pub seasonality: SeasonalProfile,
    pub next_transaction: NextTransactionPrediction,
    pub budget: BudgetSuggestion,
    pub confidence: ConfidenceScore,
    /// Overall confidence reaches the profile's threshold (always true without one)
    pub meets_threshold: bool,
}

/// Difference between two snapshots of the same payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDelta {
    pub payee_id: i64,
    pub transaction_count_change: i64,
    pub average_amount_change: f64,
    pub predicted_amount_change: f64,
    /// Days the predicted date moved (None unless both reports have a date)
    pub predicted_date_shift_days: Option<i64>,
    pub budget_change: f64,
    pub confidence_change: f64,
    pub frequency_changed: bool,
    pub trend_changed: bool,
}

impl ReportDelta {
    pub fn between(previous: &PayeeIntelligenceReport, current: &PayeeIntelligenceReport) -> Self {
        let predicted_date_shift_days = match (
            previous.next_transaction.date,
            current.next_transaction.date,
        ) {
            (Some(old), Some(new)) => Some((new - old).num_days()),
            _ => None,
        };

        Self {
            payee_id: current.payee_id,
            transaction_count_change: current.statistics.transaction_count as i64
                - previous.statistics.transaction_count as i64,
            average_amount_change: current.statistics.average_amount
                - previous.statistics.average_amount,
            predicted_amount_change: current.next_transaction.amount
                - previous.next_transaction.amount,
            predicted_date_shift_days,
            budget_change: current.budget.total_suggested - previous.budget.total_suggested,
            confidence_change: current.confidence.overall - previous.confidence.overall,
            frequency_changed: previous.frequency.detected_frequency
                != current.frequency.detected_frequency,
            trend_changed: previous.statistics.trend_direction
                != current.statistics.trend_direction,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.transaction_count_change == 0
            && self.average_amount_change.abs() < f64::EPSILON
            && self.predicted_amount_change.abs() < f64::EPSILON
            && self.predicted_date_shift_days.unwrap_or(0) == 0
            && self.budget_change.abs() < f64::EPSILON
            && self.confidence_change.abs() < f64::EPSILON
            && !self.frequency_changed
            && !self.trend_changed
    }
}

/// Month (1-12) following `as_of`
fn upcoming_month(as_of: NaiveDate) -> u32 {
    as_of.month() % 12 + 1
}

/// Per-payee intelligence over injected collaborators
pub struct IntelligenceService<'a> {
    payees: &'a dyn PayeeSource,
    transactions: &'a dyn TransactionSource,
    profiles: &'a dyn ProfileStore,
    feedback: &'a dyn FeedbackStore,
    ai: Option<&'a AIClient>,
    default_tier: PredictionTier,
    analyzers: Analyzers,
}

impl<'a> IntelligenceService<'a> {
    /// Service backed entirely by the database
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self::with_sources(db, db, db, db, config)
    }

    pub fn with_sources(
        payees: &'a dyn PayeeSource,
        transactions: &'a dyn TransactionSource,
        profiles: &'a dyn ProfileStore,
        feedback: &'a dyn FeedbackStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            payees,
            transactions,
            profiles,
            feedback,
            ai: None,
            default_tier: config.prediction.default_method,
            analyzers: Analyzers::from_config(config),
        }
    }

    /// Attach the language-model collaborator used by the ai tier
    pub fn with_ai(mut self, ai: Option<&'a AIClient>) -> Self {
        self.ai = ai;
        self
    }

    pub fn analyzers(&self) -> &Analyzers {
        &self.analyzers
    }

    fn require_payee(&self, payee_id: i64) -> Result<Payee> {
        self.payees
            .payee(payee_id)?
            .ok_or_else(|| Error::NotFound(format!("payee {}", payee_id)))
    }

    /// Concrete tier for a profile setting
    pub fn resolve_tier(&self, setting: PredictionMethodSetting) -> PredictionTier {
        match setting {
            PredictionMethodSetting::Default => self.default_tier,
            PredictionMethodSetting::Statistical => PredictionTier::Statistical,
            PredictionMethodSetting::Ml => PredictionTier::Ml,
            PredictionMethodSetting::Ai => PredictionTier::Ai,
        }
    }

    /// Stored profile, created (disabled) on first access
    pub fn profile(&self, payee_id: i64) -> Result<IntelligenceProfile> {
        self.require_payee(payee_id)?;
        if let Some(profile) = self.profiles.get(payee_id)? {
            return Ok(profile);
        }

        let profile = IntelligenceProfile::default();
        self.profiles.put(payee_id, &profile)?;
        debug!(payee_id, "Created default intelligence profile");
        Ok(profile)
    }

    /// Validate and store a profile
    pub fn update_profile(&self, payee_id: i64, profile: &IntelligenceProfile) -> Result<()> {
        profile.validate()?;
        self.require_payee(payee_id)?;
        self.profiles.put(payee_id, profile)?;
        info!(payee_id, enabled = profile.enabled, "Updated intelligence profile");
        Ok(())
    }

    /// Validate and append feedback on a past prediction
    pub fn record_feedback(&self, feedback: &NewPredictionFeedback) -> Result<i64> {
        feedback.validate()?;
        self.require_payee(feedback.payee_id)?;
        let id = self.feedback.record_feedback(feedback)?;
        info!(
            payee_id = feedback.payee_id,
            prediction_type = feedback.prediction_type.as_str(),
            "Recorded prediction feedback"
        );
        Ok(id)
    }

    /// Full report for one payee as of `as_of`
    pub async fn analyze(&self, payee_id: i64, as_of: NaiveDate) -> Result<PayeeIntelligenceReport> {
        let payee = self.require_payee(payee_id)?;
        let profile = self.profile(payee_id)?;
        let filters = profile.effective_filters();
        let tier = self.resolve_tier(filters.prediction_method);

        let transactions = self.transactions.query(payee_id, &filters, as_of)?;
        let feedback = self.feedback.list_feedback(payee_id, None)?;

        let mut report = self
            .analyzers
            .report(&payee, &profile, &transactions, &feedback, as_of, tier);

        if tier == PredictionTier::Ai {
            report.next_transaction = self
                .refine_with_ai(&payee, &transactions, &report)
                .await;
        }

        Ok(report)
    }

    pub async fn predict_next(
        &self,
        payee_id: i64,
        as_of: NaiveDate,
    ) -> Result<NextTransactionPrediction> {
        Ok(self.analyze(payee_id, as_of).await?.next_transaction)
    }

    pub async fn suggest_budget(&self, payee_id: i64, as_of: NaiveDate) -> Result<BudgetSuggestion> {
        Ok(self.analyze(payee_id, as_of).await?.budget)
    }

    /// Layer the language model over the local prediction; any failure keeps the local one
    async fn refine_with_ai(
        &self,
        payee: &Payee,
        transactions: &[Transaction],
        report: &PayeeIntelligenceReport,
    ) -> NextTransactionPrediction {
        let base = report.next_transaction.clone();
        if base.method == PredictionMethod::InsufficientData {
            return base;
        }

        let Some(ai) = self.ai else {
            warn!(
                payee_id = payee.id,
                fallback = %base.method,
                "AI tier requested but no AI backend is configured"
            );
            return base;
        };

        let mut chronological: Vec<&Transaction> = transactions.iter().collect();
        chronological.sort_by_key(|tx| tx.date);
        let skip = chronological.len().saturating_sub(AI_CONTEXT_AMOUNTS);
        let context = PredictionContext {
            payee_name: payee.name.clone(),
            frequency: report.frequency.detected_frequency,
            average_days_between: report.frequency.average_days_between,
            recent_amounts: chronological[skip..].iter().map(|tx| tx.magnitude()).collect(),
            base_amount: base.amount,
            base_date: base.date,
            trend: report.statistics.trend_direction,
            trend_strength: report.statistics.trend_strength,
            volatility: report.statistics.volatility,
        };

        match ai.refine_prediction(&context).await {
            Ok(refinement) => {
                let mut refined = base.clone();

                if let Some(amount) = refinement.amount {
                    // Refinements far from the local forecast are ignored
                    if base.amount <= 0.0 || (amount >= base.amount * 0.5 && amount <= base.amount * 2.0) {
                        let shift = amount - base.amount;
                        refined.amount = amount;
                        refined.amount_range = [
                            (base.amount_range[0] + shift).max(0.0),
                            base.amount_range[1] + shift,
                        ];
                    } else {
                        debug!(payee_id = payee.id, amount, "Ignoring out-of-range AI amount");
                    }
                }

                if let (Some(days), Some(last)) =
                    (refinement.days_until_next, report.statistics.last_date)
                {
                    match Duration::try_days(days).and_then(|d| last.checked_add_signed(d)) {
                        Some(next) => refined.date = Some(next),
                        None => {
                            warn!(
                                payee_id = payee.id,
                                days,
                                fallback = %base.method,
                                "AI refinement date out of range"
                            );
                            return base;
                        }
                    }
                }

                if let Some(confidence) = refinement.confidence {
                    // The model can temper confidence, never raise it
                    refined.confidence = stats::unit(confidence.min(base.confidence));
                }

                if !refinement.explanation.trim().is_empty() {
                    refined.explanation = Some(refinement.explanation.trim().to_string());
                }
                refined.method = PredictionMethod::Ai;
                debug!(payee_id = payee.id, model = ai.model(), "Applied AI refinement");
                refined
            }
            Err(e) => {
                warn!(
                    payee_id = payee.id,
                    error = %e,
                    fallback = %base.method,
                    "AI refinement failed"
                );
                base
            }
        }
    }
}
