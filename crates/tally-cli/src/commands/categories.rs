//! Category learning commands

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tally_core::categories::{CategoryLearningEngine, DefaultCategorySuggestion};
use tally_core::config::EngineConfig;
use tally_core::db::Database;
use tally_core::models::{CorrectionTrigger, NewCategoryCorrection};

use super::{category_label, percent, resolve_category, resolve_payee, truncate};

/// Arguments of `tally categories correct`
#[derive(Debug, Clone)]
pub struct CorrectionArgs<'s> {
    pub payee: &'s str,
    pub to: &'s str,
    pub from: Option<&'s str>,
    pub confidence: u8,
    pub trigger: &'s str,
    pub amount: Option<f64>,
    pub date: Option<&'s str>,
}

pub fn cmd_categories_correct(
    db: &Database,
    config: &EngineConfig,
    args: &CorrectionArgs<'_>,
) -> Result<i64> {
    let payee = resolve_payee(db, args.payee)?;
    let to = resolve_category(db, args.to)?;
    // Without --from the correction moves away from the payee's current default
    let from_category_id = match args.from {
        Some(from) => Some(resolve_category(db, from)?.id),
        None => payee.default_category_id,
    };
    let trigger: CorrectionTrigger = args
        .trigger
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let transaction_date = args
        .date
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .context("Invalid --date format (use YYYY-MM-DD)")?;

    let engine = CategoryLearningEngine::new(db, &config.categories);
    let id = engine.record_correction(
        &NewCategoryCorrection {
            payee_id: payee.id,
            from_category_id,
            to_category_id: to.id,
            user_confidence: args.confidence,
            trigger,
            transaction_amount: args.amount,
            transaction_date,
        },
        None,
    )?;

    println!(
        "✅ Recorded correction for {}: {} → {} (ID: {})",
        payee.name,
        category_label(db, from_category_id)?,
        to.name,
        id
    );
    Ok(id)
}

pub fn cmd_categories_recommend(db: &Database, config: &EngineConfig, payee: &str) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let engine = CategoryLearningEngine::new(db, &config.categories);
    let recommendation = engine.get_category_recommendations(payee.id)?;

    println!();
    println!("🏷️  Category for {}", payee.name);
    println!(
        "   Recommended: {} ({} confidence)",
        category_label(db, recommendation.recommended_category_id)?,
        percent(recommendation.confidence)
    );
    for reason in &recommendation.reasoning {
        println!("   • {}", reason);
    }

    let patterns = engine.analyze_correction_patterns(payee.id)?;
    if !patterns.is_empty() {
        println!();
        println!("   Corrections:");
        for pattern in patterns {
            println!(
                "   {:>3}x {} → {} (avg certainty {:.1}/10, last {})",
                pattern.frequency,
                category_label(db, pattern.from_category_id)?,
                category_label(db, Some(pattern.to_category_id))?,
                pattern.average_user_confidence,
                pattern.last_corrected_at.format("%Y-%m-%d")
            );
        }
    }

    Ok(())
}

pub fn cmd_categories_drift(db: &Database, config: &EngineConfig, payee: &str) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let engine = CategoryLearningEngine::new(db, &config.categories);

    match engine.detect_category_drift(payee.id)? {
        None => println!("Not enough corrections for {} to judge drift.", payee.name),
        Some(drift) if !drift.drift_detected => {
            println!(
                "✅ {} is stable in {}",
                payee.name,
                category_label(db, Some(drift.current_category_id))?
            );
        }
        Some(drift) => {
            println!(
                "⚠️  {} drifted from {} to {} ({} strength)",
                payee.name,
                category_label(db, Some(drift.previous_category_id))?,
                category_label(db, Some(drift.current_category_id))?,
                percent(drift.strength)
            );
            println!("   {}", drift.description);
        }
    }

    Ok(())
}

pub async fn cmd_categories_suggest(
    db: &Database,
    config: &EngineConfig,
    apply: bool,
) -> Result<Vec<DefaultCategorySuggestion>> {
    let engine = CategoryLearningEngine::new(db, &config.categories);
    let suggestions = engine.suggest_default_category_updates().await?;

    if suggestions.is_empty() {
        println!("No default category changes suggested.");
        return Ok(suggestions);
    }

    println!();
    println!("💡 Default category suggestions");
    println!("   ─────────────────────────────────────────────────────────────");
    for suggestion in &suggestions {
        println!(
            "   {:25} │ {} → {} │ {} ({} corrections)",
            truncate(&suggestion.payee_name, 25),
            category_label(db, suggestion.current_category_id)?,
            category_label(db, Some(suggestion.suggested_category_id))?,
            percent(suggestion.confidence),
            suggestion.correction_count
        );
        if apply {
            db.set_default_category(suggestion.payee_id, Some(suggestion.suggested_category_id))?;
        }
    }

    if apply {
        println!();
        println!("✅ Applied {} suggestion(s)", suggestions.len());
    } else {
        println!();
        println!("Run with --apply to update the defaults.");
    }

    Ok(suggestions)
}
