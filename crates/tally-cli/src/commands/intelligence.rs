//! Intelligence command implementations
//!
//! Analyze, predict and budget run the full per-payee report. The `ai` tier
//! uses the backend configured through `AI_BACKEND` / `OLLAMA_HOST` when set.

use anyhow::Result;
use chrono::NaiveDate;
use tally_core::ai::{AIBackend, AIClient};
use tally_core::config::EngineConfig;
use tally_core::db::Database;
use tally_core::intelligence::{
    BudgetSuggestion, IntelligenceService, NextTransactionPrediction, PayeeIntelligenceReport,
};
use tally_core::models::{
    AmountSign, CategoryType, DateRangeFilter, DateRangeType, IntelligenceProfile,
    NewPredictionFeedback, PredictionMethodSetting, PredictionType,
};

use super::{percent, resolve_payee};

/// Settings to change on a profile; `None` / `false` keeps the stored value
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub enable: bool,
    pub disable: bool,
    pub sign: Option<String>,
    pub last_months: Option<u32>,
    pub last_years: Option<u32>,
    pub all_time: bool,
    pub category_types: Vec<String>,
    pub exclude_transfers: bool,
    pub include_transfers: bool,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub method: Option<String>,
    pub threshold: Option<f64>,
}

fn parse_sign(value: &str) -> Result<AmountSign> {
    match value.to_lowercase().as_str() {
        "all" => Ok(AmountSign::All),
        "positive" | "income" => Ok(AmountSign::Positive),
        "negative" | "expense" => Ok(AmountSign::Negative),
        _ => anyhow::bail!("Unknown amount sign: {} (use all, positive, negative)", value),
    }
}

fn parse_method(value: &str) -> Result<PredictionMethodSetting> {
    match value.to_lowercase().as_str() {
        "default" => Ok(PredictionMethodSetting::Default),
        "statistical" => Ok(PredictionMethodSetting::Statistical),
        "ml" => Ok(PredictionMethodSetting::Ml),
        "ai" => Ok(PredictionMethodSetting::Ai),
        _ => anyhow::bail!(
            "Unknown prediction method: {} (use default, statistical, ml, ai)",
            value
        ),
    }
}

impl ProfileChanges {
    /// Apply the requested changes on top of a stored profile
    pub fn apply(&self, mut profile: IntelligenceProfile) -> Result<IntelligenceProfile> {
        if self.enable {
            profile.enabled = true;
        }
        if self.disable {
            profile.enabled = false;
        }

        let filters = &mut profile.filters;
        if let Some(sign) = &self.sign {
            filters.amount_sign = parse_sign(sign)?;
        }
        if let Some(n) = self.last_months {
            filters.date_range = DateRangeFilter::last_months(n);
        }
        if let Some(n) = self.last_years {
            filters.date_range = DateRangeFilter::last_years(n);
        }
        if self.all_time {
            filters.date_range = DateRangeFilter::default();
        }
        if !self.category_types.is_empty() {
            filters.category_types = self
                .category_types
                .iter()
                .map(|t| t.parse::<CategoryType>().map_err(|e| anyhow::anyhow!(e)))
                .collect::<Result<Vec<_>>>()?;
        }
        if self.exclude_transfers {
            filters.exclude_transfers = true;
        }
        if self.include_transfers {
            filters.exclude_transfers = false;
        }
        if self.min_amount.is_some() {
            filters.min_amount = self.min_amount;
        }
        if self.max_amount.is_some() {
            filters.max_amount = self.max_amount;
        }
        if let Some(method) = &self.method {
            filters.prediction_method = parse_method(method)?;
        }
        if self.threshold.is_some() {
            profile.confidence_threshold = self.threshold;
        }

        Ok(profile)
    }
}

/// AI client from the environment, reporting whether it is reachable
async fn ai_from_env() -> Option<AIClient> {
    let ai = AIClient::from_env()?;
    if ai.health_check().await {
        tracing::debug!(host = ai.host(), model = ai.model(), "AI backend available");
        Some(ai)
    } else {
        tracing::warn!(host = ai.host(), "AI backend unreachable, using local tiers");
        None
    }
}

async fn report_for(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
) -> Result<PayeeIntelligenceReport> {
    let payee = resolve_payee(db, payee)?;
    let ai = ai_from_env().await;
    let service = IntelligenceService::new(db, config).with_ai(ai.as_ref());
    Ok(service.analyze(payee.id, as_of).await?)
}

fn print_prediction(prediction: &NextTransactionPrediction) {
    let date = prediction
        .date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "   Next transaction: ${:.2} on {} (range ${:.2} - ${:.2})",
        prediction.amount, date, prediction.amount_range[0], prediction.amount_range[1]
    );
    println!(
        "   Method: {} (requested tier: {}), confidence {}",
        prediction.method,
        prediction.tier,
        percent(prediction.confidence)
    );
    if let Some(explanation) = &prediction.explanation {
        println!("   🤖 {}", explanation);
    }
}

fn print_budget(budget: &BudgetSuggestion) {
    println!(
        "   Suggested budget for month {}: ${:.2} (${:.2} x {:.2}/month), confidence {}",
        budget.target_month,
        budget.total_suggested,
        budget.base_monthly_amount,
        budget.occurrences_per_month,
        percent(budget.confidence)
    );
    for adjustment in &budget.seasonal_adjustments {
        println!(
            "     ↳ x{:.2} ({:+.2}): {}",
            adjustment.multiplier, adjustment.amount_delta, adjustment.reason
        );
    }
}

pub async fn cmd_analyze(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
    json: bool,
) -> Result<()> {
    let report = report_for(db, config, payee, as_of).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stats = &report.statistics;
    let frequency = &report.frequency;

    println!();
    println!("📊 {} (as of {})", report.payee_name, report.as_of);
    println!("   ─────────────────────────────────────────────────────────────");
    if stats.transaction_count == 0 {
        println!("   No transactions match this payee's profile yet.");
    }
    println!(
        "   Transactions: {}  │  Total ${:.2}  │  Avg ${:.2}  │  Median ${:.2}",
        stats.transaction_count, stats.total_amount, stats.average_amount, stats.median_amount
    );
    println!(
        "   Range: ${:.2} - ${:.2}  │  Trend: {} ({:.0}%)  │  Volatility {:.2}",
        stats.min_amount,
        stats.max_amount,
        stats.trend_direction.as_str(),
        stats.trend_strength * 100.0,
        stats.volatility
    );
    if !stats.outlier_transactions.is_empty() {
        println!("   Outliers: {}", stats.outlier_transactions.len());
    }

    let detected = frequency
        .detected_frequency
        .map(|f| f.as_str())
        .unwrap_or("none");
    println!(
        "   Frequency: {} every {:.1} days  │  Regularity {}",
        detected,
        frequency.average_days_between,
        percent(frequency.regularity_score)
    );
    if report.seasonality.is_seasonal {
        println!(
            "   Seasonal: amplitude {:.0}%",
            report.seasonality.amplitude * 100.0
        );
    }

    println!();
    print_prediction(&report.next_transaction);
    print_budget(&report.budget);

    println!();
    println!(
        "   Confidence {}: data {} │ pattern {} │ accuracy {}",
        percent(report.confidence.overall),
        percent(report.confidence.data_quality.score),
        percent(report.confidence.pattern_reliability.score),
        if report.confidence.has_feedback {
            percent(report.confidence.prediction_accuracy.score)
        } else {
            "n/a".to_string()
        }
    );
    println!("   {}", report.confidence.explanation);
    if !report.meets_threshold {
        println!("   ⚠️  Below this payee's confidence threshold");
    }

    Ok(())
}

pub async fn cmd_predict(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
    json: bool,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let ai = ai_from_env().await;
    let service = IntelligenceService::new(db, config).with_ai(ai.as_ref());
    let prediction = service.predict_next(payee.id, as_of).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!();
    println!("🔮 {}", payee.name);
    print_prediction(&prediction);
    Ok(())
}

pub async fn cmd_budget(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
    json: bool,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let budget = IntelligenceService::new(db, config)
        .suggest_budget(payee.id, as_of)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&budget)?);
        return Ok(());
    }

    println!();
    println!("💰 {}", payee.name);
    print_budget(&budget);
    Ok(())
}

pub fn cmd_profile_show(db: &Database, config: &EngineConfig, payee: &str) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let service = IntelligenceService::new(db, config);
    let profile = service.profile(payee.id)?;
    let filters = &profile.filters;

    println!();
    println!("⚙️  Profile for {}", payee.name);
    println!(
        "   Enabled: {}",
        if profile.enabled { "yes" } else { "no (filters stored but not applied)" }
    );
    let types = if filters.category_types.is_empty() {
        "all".to_string()
    } else {
        filters
            .category_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("   Category types: {}", types);
    println!("   Amount sign: {:?}", filters.amount_sign);
    let range = match (filters.date_range.range_type, filters.date_range.months) {
        (DateRangeType::LastNMonths, Some(n)) => format!("last {} months", n),
        (DateRangeType::LastNYears, Some(n)) => format!("last {} years", n),
        _ => "all time".to_string(),
    };
    println!("   Date range: {}", range);
    println!("   Exclude transfers: {}", filters.exclude_transfers);
    println!(
        "   Amount bounds: {} - {}",
        filters
            .min_amount
            .map_or_else(|| "none".to_string(), |v| format!("${:.2}", v)),
        filters
            .max_amount
            .map_or_else(|| "none".to_string(), |v| format!("${:.2}", v))
    );
    println!(
        "   Prediction method: {:?} (resolves to {})",
        filters.prediction_method,
        service.resolve_tier(filters.prediction_method)
    );
    if let Some(threshold) = profile.confidence_threshold {
        println!("   Confidence threshold: {}", percent(threshold));
    }

    Ok(())
}

pub fn cmd_profile_set(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    changes: &ProfileChanges,
) -> Result<IntelligenceProfile> {
    let payee = resolve_payee(db, payee)?;
    let service = IntelligenceService::new(db, config);
    let profile = changes.apply(service.profile(payee.id)?)?;
    service.update_profile(payee.id, &profile)?;

    println!("✅ Updated profile for {}", payee.name);
    Ok(profile)
}

pub fn cmd_feedback(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    prediction_type: &str,
    original: f64,
    corrected: Option<f64>,
    rating: Option<u8>,
) -> Result<i64> {
    let payee = resolve_payee(db, payee)?;
    let prediction_type: PredictionType = prediction_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let id = IntelligenceService::new(db, config).record_feedback(&NewPredictionFeedback {
        payee_id: payee.id,
        prediction_type,
        original_value: original,
        corrected_value: corrected,
        rating,
    })?;

    println!("✅ Feedback recorded for {} (ID: {})", payee.name, id);
    Ok(id)
}
