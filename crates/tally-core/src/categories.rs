//! Category Learning Engine
//!
//! Learns which category a payee really belongs to from the append-only log
//! of user corrections, and notices when that preference drifts over time.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::CategoryConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{CategoryCorrection, NewCategoryCorrection, Payee};
use crate::sources::{CategorySource, CorrectionStore, PayeeSource};
use crate::stats;

/// Confidence attached to a recommendation that only echoes the payee default
pub const NO_HISTORY_CONFIDENCE: f64 = 0.1;

/// Aggregate of every correction between the same two categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPattern {
    pub from_category_id: Option<i64>,
    pub to_category_id: i64,
    pub frequency: usize,
    pub average_user_confidence: f64,
    pub last_corrected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecommendation {
    pub payee_id: i64,
    pub recommended_category_id: Option<i64>,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// Change in preferred category between the older and newer corrections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDrift {
    pub payee_id: i64,
    pub drift_detected: bool,
    pub previous_category_id: i64,
    pub current_category_id: i64,
    /// 0 = no shift, 1 = every recent correction points at the new category
    pub strength: f64,
    pub older_corrections: usize,
    pub recent_corrections: usize,
    pub description: String,
}

/// Proposed change to a payee's default category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultCategorySuggestion {
    pub payee_id: i64,
    pub payee_name: String,
    pub current_category_id: Option<i64>,
    pub suggested_category_id: i64,
    pub confidence: f64,
    pub correction_count: usize,
    pub reasoning: Vec<String>,
}

/// Group corrections by (from, to), most frequent first
pub fn correction_patterns(corrections: &[CategoryCorrection]) -> Vec<CorrectionPattern> {
    let mut groups: HashMap<(Option<i64>, i64), Vec<&CategoryCorrection>> = HashMap::new();
    for correction in corrections {
        groups
            .entry((correction.from_category_id, correction.to_category_id))
            .or_default()
            .push(correction);
    }

    let mut patterns: Vec<CorrectionPattern> = groups
        .into_iter()
        .filter_map(|((from, to), group)| {
            let last = group.iter().map(|c| c.created_at).max()?;
            let confidences: Vec<f64> = group.iter().map(|c| f64::from(c.user_confidence)).collect();
            Some(CorrectionPattern {
                from_category_id: from,
                to_category_id: to,
                frequency: group.len(),
                average_user_confidence: stats::mean(&confidences),
                last_corrected_at: last,
            })
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then(b.average_user_confidence.total_cmp(&a.average_user_confidence))
            .then(b.last_corrected_at.cmp(&a.last_corrected_at))
            .then(a.to_category_id.cmp(&b.to_category_id))
    });
    patterns
}

/// Confidence that `category_id` is right, from corrections into it
///
/// 0 without such corrections; otherwise blends count (saturating), recency
/// (exponential decay with the given half-life) and average user confidence.
pub fn category_confidence(
    corrections: &[CategoryCorrection],
    category_id: i64,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> f64 {
    let relevant: Vec<&CategoryCorrection> = corrections
        .iter()
        .filter(|c| c.to_category_id == category_id)
        .collect();
    if relevant.is_empty() {
        return 0.0;
    }

    let count = relevant.len() as f64;
    let count_factor = 1.0 - (-count / 3.0).exp();

    let half_life = half_life_days.max(1.0);
    let recency: Vec<f64> = relevant
        .iter()
        .map(|c| {
            let age_days = (now - c.created_at).num_seconds().max(0) as f64 / 86_400.0;
            0.5_f64.powf(age_days / half_life)
        })
        .collect();

    let user: Vec<f64> = relevant
        .iter()
        .map(|c| f64::from(c.user_confidence.min(10)) / 10.0)
        .collect();

    stats::unit(0.4 * count_factor + 0.3 * stats::mean(&recency) + 0.3 * stats::mean(&user))
}

/// Best target category in `corrections` with its confidence
///
/// Ties go to the category corrected most recently.
fn best_category(
    corrections: &[CategoryCorrection],
    now: DateTime<Utc>,
    half_life_days: f64,
) -> Option<(i64, f64)> {
    let mut latest: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for c in corrections {
        let entry = latest.entry(c.to_category_id).or_insert(c.created_at);
        if c.created_at > *entry {
            *entry = c.created_at;
        }
    }

    latest
        .into_iter()
        .map(|(category, last)| {
            (
                category,
                category_confidence(corrections, category, now, half_life_days),
                last,
            )
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)))
        .map(|(category, confidence, _)| (category, confidence))
}

/// Recommendation from the correction log, or the payee default without one
pub fn recommend(
    payee: &Payee,
    corrections: &[CategoryCorrection],
    now: DateTime<Utc>,
    half_life_days: f64,
) -> CategoryRecommendation {
    let Some((category, confidence)) = best_category(corrections, now, half_life_days) else {
        return CategoryRecommendation {
            payee_id: payee.id,
            recommended_category_id: payee.default_category_id,
            confidence: if payee.default_category_id.is_some() {
                NO_HISTORY_CONFIDENCE
            } else {
                0.0
            },
            reasoning: vec!["no correction history".to_string()],
        };
    };

    let into: Vec<&CategoryCorrection> = corrections
        .iter()
        .filter(|c| c.to_category_id == category)
        .collect();
    let average_user = stats::mean(
        &into
            .iter()
            .map(|c| f64::from(c.user_confidence))
            .collect::<Vec<_>>(),
    );
    let mut reasoning = vec![
        format!(
            "Corrected to category {} {} time{}",
            category,
            into.len(),
            if into.len() == 1 { "" } else { "s" }
        ),
        format!("Average user confidence {:.1}/10", average_user),
    ];
    if let Some(last) = into.iter().map(|c| c.created_at).max() {
        reasoning.push(format!(
            "Most recent correction {} days ago",
            (now - last).num_days().max(0)
        ));
    }
    if payee.default_category_id == Some(category) {
        reasoning.push("Matches the current default category".to_string());
    }

    CategoryRecommendation {
        payee_id: payee.id,
        recommended_category_id: Some(category),
        confidence,
        reasoning,
    }
}

/// Minimum corrections before drift is assessed
pub const DRIFT_MIN_CORRECTIONS: usize = 3;

/// Compare the preferred category of the older and newer halves of the log
///
/// `corrections` must be ordered by `created_at`; an odd middle entry counts as recent.
pub fn detect_drift(
    payee_id: i64,
    corrections: &[CategoryCorrection],
    now: DateTime<Utc>,
    half_life_days: f64,
) -> Option<CategoryDrift> {
    if corrections.len() < DRIFT_MIN_CORRECTIONS {
        return None;
    }

    let (older, recent) = corrections.split_at(corrections.len() / 2);
    let (previous, _) = best_category(older, now, half_life_days)?;
    let (current, _) = best_category(recent, now, half_life_days)?;

    let share = |category: i64| {
        recent.iter().filter(|c| c.to_category_id == category).count() as f64
            / recent.len() as f64
    };

    let (drift_detected, strength, description) = if previous == current {
        (
            false,
            0.0,
            format!("Category {} has been preferred throughout", current),
        )
    } else {
        let strength = stats::unit(share(current) - share(previous));
        (
            true,
            strength,
            format!(
                "Preference shifted from category {} to category {}",
                previous, current
            ),
        )
    };

    Some(CategoryDrift {
        payee_id,
        drift_detected,
        previous_category_id: previous,
        current_category_id: current,
        strength,
        older_corrections: older.len(),
        recent_corrections: recent.len(),
        description,
    })
}

/// Category learning over the payee, category and correction collaborators
pub struct CategoryLearningEngine<'a> {
    payees: &'a dyn PayeeSource,
    categories: &'a dyn CategorySource,
    corrections: &'a dyn CorrectionStore,
    config: CategoryConfig,
    now: Option<DateTime<Utc>>,
}

impl<'a> CategoryLearningEngine<'a> {
    pub fn new(db: &'a Database, config: &CategoryConfig) -> Self {
        Self::with_sources(db, db, db, config)
    }

    pub fn with_sources(
        payees: &'a dyn PayeeSource,
        categories: &'a dyn CategorySource,
        corrections: &'a dyn CorrectionStore,
        config: &CategoryConfig,
    ) -> Self {
        Self {
            payees,
            categories,
            corrections,
            config: config.clone(),
            now: None,
        }
    }

    /// Evaluate recency against a fixed instant instead of the wall clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn require_payee(&self, payee_id: i64) -> Result<Payee> {
        self.payees
            .payee(payee_id)?
            .ok_or_else(|| Error::NotFound(format!("payee {}", payee_id)))
    }

    fn require_category(&self, category_id: i64) -> Result<()> {
        if self.categories.exists(category_id)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("category {}", category_id)))
        }
    }

    /// Validate and append a correction to the log
    pub fn record_correction(
        &self,
        correction: &NewCategoryCorrection,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        if correction.user_confidence > 10 {
            return Err(Error::Validation(format!(
                "userConfidence must be between 0 and 10, got {}",
                correction.user_confidence
            )));
        }
        if correction.from_category_id == Some(correction.to_category_id) {
            return Err(Error::Validation(
                "correction must change the category".into(),
            ));
        }

        self.require_payee(correction.payee_id)?;
        self.require_category(correction.to_category_id)?;
        if let Some(from) = correction.from_category_id {
            self.require_category(from)?;
        }

        let mut sanitized = correction.clone();
        sanitized.transaction_amount = correction.transaction_amount.map(stats::sanitize);

        let id = self.corrections.append(&sanitized, recorded_at)?;
        info!(
            payee_id = correction.payee_id,
            to_category_id = correction.to_category_id,
            "Recorded category correction"
        );
        Ok(id)
    }

    pub fn analyze_correction_patterns(&self, payee_id: i64) -> Result<Vec<CorrectionPattern>> {
        self.require_payee(payee_id)?;
        Ok(correction_patterns(&self.corrections.query(payee_id)?))
    }

    pub fn get_category_recommendations(&self, payee_id: i64) -> Result<CategoryRecommendation> {
        let payee = self.require_payee(payee_id)?;
        let corrections = self.corrections.query(payee_id)?;
        Ok(recommend(
            &payee,
            &corrections,
            self.now(),
            self.config.recency_half_life_days,
        ))
    }

    pub fn calculate_category_confidence(&self, payee_id: i64, category_id: i64) -> Result<f64> {
        self.require_payee(payee_id)?;
        self.require_category(category_id)?;
        let corrections = self.corrections.query(payee_id)?;
        Ok(category_confidence(
            &corrections,
            category_id,
            self.now(),
            self.config.recency_half_life_days,
        ))
    }

    pub fn detect_category_drift(&self, payee_id: i64) -> Result<Option<CategoryDrift>> {
        self.require_payee(payee_id)?;
        let corrections = self.corrections.query(payee_id)?;
        Ok(detect_drift(
            payee_id,
            &corrections,
            self.now(),
            self.config.recency_half_life_days,
        ))
    }

    /// Propose new default categories for every payee with enough recent corrections
    ///
    /// Each payee is scored on its own task; dropping the future aborts the batch.
    pub async fn suggest_default_category_updates(&self) -> Result<Vec<DefaultCategorySuggestion>> {
        let now = self.now();
        let since = now - Duration::days(self.config.qualification_window_days);
        let qualifying = self
            .corrections
            .qualifying_payees(self.config.qualification_min_corrections, since)?;

        let half_life = self.config.recency_half_life_days;
        let min_confidence = self.config.suggestion_min_confidence;

        let mut tasks = JoinSet::new();
        for payee_id in qualifying {
            let Some(payee) = self.payees.payee(payee_id)? else {
                continue;
            };
            let corrections = self.corrections.query(payee_id)?;
            tasks.spawn(async move {
                let recommendation = recommend(&payee, &corrections, now, half_life);
                let suggested = recommendation.recommended_category_id?;
                if Some(suggested) == payee.default_category_id
                    || recommendation.confidence < min_confidence
                {
                    return None;
                }
                Some(DefaultCategorySuggestion {
                    payee_id: payee.id,
                    payee_name: payee.name,
                    current_category_id: payee.default_category_id,
                    suggested_category_id: suggested,
                    confidence: recommendation.confidence,
                    correction_count: corrections.len(),
                    reasoning: recommendation.reasoning,
                })
            });
        }

        let mut suggestions = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Some(suggestion) = result? {
                suggestions.push(suggestion);
            }
        }
        suggestions.sort_by_key(|s| s.payee_id);

        debug!(count = suggestions.len(), "Scored default category candidates");
        info!(
            suggestions = suggestions.len(),
            "Default category scan complete"
        );
        Ok(suggestions)
    }
}
