//! Subscription command implementations

use anyhow::Result;
use chrono::NaiveDate;
use tally_core::config::EngineConfig;
use tally_core::db::Database;
use tally_core::models::{NewLifecycleEvent, SubscriptionStatus};
use tally_core::subscriptions::{SubscriptionClassification, SubscriptionEngine};

use super::{parse_date_arg, percent, resolve_payee, truncate};

fn cycle_label(classification: &SubscriptionClassification) -> &'static str {
    classification
        .billing_cycle
        .map(|c| c.as_str())
        .unwrap_or("irregular")
}

pub async fn cmd_subscriptions_detect(
    db: &Database,
    config: &EngineConfig,
    as_of: NaiveDate,
    confirm: bool,
    json: bool,
) -> Result<Vec<SubscriptionClassification>> {
    let engine = SubscriptionEngine::new(db, config).at(as_of);
    let detected = engine.scan_subscriptions().await?;

    if confirm {
        for classification in &detected {
            db.mark_subscription(
                classification.payee_id,
                Some(&classification.suggested_metadata),
            )?;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
        return Ok(detected);
    }

    if detected.is_empty() {
        println!("No new subscriptions detected.");
        return Ok(detected);
    }

    println!();
    println!("🔍 Likely subscriptions");
    println!("   ─────────────────────────────────────────────────────────────");
    for classification in &detected {
        println!(
            "   {:25} │ {:>4} │ {:13} │ {:9} │ ${:.2}",
            truncate(&classification.payee_name, 25),
            percent(classification.detection_confidence),
            classification.subscription_type,
            cycle_label(classification),
            classification.suggested_metadata.base_cost
        );
    }

    println!();
    if confirm {
        println!("✅ Marked {} payee(s) as subscriptions", detected.len());
    } else {
        println!("Run with --confirm to mark these payees as subscriptions.");
    }

    Ok(detected)
}

pub fn cmd_subscriptions_classify(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    json: bool,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let engine = SubscriptionEngine::new(db, config);
    let classification = engine.classify_subscription(payee.id, None)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
        return Ok(());
    }

    println!();
    println!(
        "🔁 {}: {} subscription confidence",
        classification.payee_name,
        percent(classification.detection_confidence)
    );
    println!(
        "   Type: {}  │  Cycle: {}  │  {} charges",
        classification.subscription_type,
        cycle_label(&classification),
        classification.transaction_count
    );
    for method in &classification.detection_methods {
        println!(
            "   ✓ {:10} {:>4}  {}",
            method.method.as_str(),
            percent(method.confidence),
            method.evidence
        );
    }
    for risk in &classification.risk_factors {
        println!("   ⚠️  {}", risk);
    }

    Ok(())
}

pub fn cmd_subscriptions_lifecycle(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let engine = SubscriptionEngine::new(db, config).at(as_of);
    let lifecycle = engine.track_subscription_lifecycle(payee.id)?;

    println!();
    println!("📅 {} (as of {})", payee.name, as_of);
    match lifecycle.current_status {
        Some(status) => {
            let since = lifecycle
                .status_since
                .map(|d| format!(" since {}", d))
                .unwrap_or_default();
            println!(
                "   Status: {}{} ({:?})",
                status, since, lifecycle.status_source
            );
        }
        None => println!("   Status: unknown (no events or charges)"),
    }
    if let Some(last) = lifecycle.last_charge_date {
        println!("   Last charge: {}", last);
    }
    if let Some(next) = lifecycle.expected_next_charge {
        println!("   Expected next charge: {}", next);
    }
    if lifecycle.days_overdue > 0 {
        println!("   ⏰ {} days overdue", lifecycle.days_overdue);
    }
    println!(
        "   Cancellation probability: {}  │  Assessment: {}",
        percent(lifecycle.cancellation_probability),
        lifecycle.assessment
    );
    for reason in &lifecycle.reasons {
        println!("   • {}", reason);
    }

    Ok(())
}

pub fn cmd_subscriptions_event(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    status: &str,
    date: Option<&str>,
    note: Option<&str>,
) -> Result<i64> {
    let payee = resolve_payee(db, payee)?;
    let status: SubscriptionStatus = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let date = parse_date_arg(date, "date")?;

    let engine = SubscriptionEngine::new(db, config);
    let id = engine.record_lifecycle_event(&NewLifecycleEvent {
        payee_id: payee.id,
        status,
        date,
        note: note.map(String::from),
    })?;

    println!("✅ {} is {} as of {} (ID: {})", payee.name, status, date, id);
    Ok(id)
}

pub fn cmd_subscriptions_costs(db: &Database, config: &EngineConfig, payee: &str) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let costs = SubscriptionEngine::new(db, config).analyze_costs(payee.id)?;

    if costs.charge_count == 0 {
        println!("No charges recorded for {}.", payee.name);
        return Ok(());
    }

    println!();
    println!("💳 {} ({})", payee.name, costs.currency);
    println!(
        "   Current ${:.2}  │  Original ${:.2}  │  Average ${:.2}",
        costs.current_cost, costs.original_cost, costs.average_cost
    );
    println!(
        "   ${:.2}/month  │  ${:.2}/year  │  ${:.2} over {} charges",
        costs.monthly_equivalent, costs.annual_equivalent, costs.total_spent, costs.charge_count
    );
    println!("   Trend: {}", costs.trend.as_str());

    for change in &costs.price_changes {
        println!(
            "   {} ${:.2} → ${:.2} ({:+.1}%)",
            change.date, change.previous_amount, change.new_amount, change.change_percent
        );
    }
    if costs.price_increase_alert {
        println!("   ⚠️  Price has increased since the first charge");
    }

    Ok(())
}

pub fn cmd_subscriptions_renewals(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    count: usize,
    as_of: NaiveDate,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let engine = SubscriptionEngine::new(db, config).at(as_of);
    let renewals = engine.predict_renewals(payee.id, count)?;

    if renewals.is_empty() {
        println!("No upcoming renewals for {}.", payee.name);
        return Ok(());
    }

    println!();
    println!("🔄 Upcoming renewals for {}", payee.name);
    for renewal in renewals {
        println!(
            "   #{} {}  ${:.2}  ({})",
            renewal.sequence,
            renewal.date,
            renewal.expected_cost,
            percent(renewal.confidence)
        );
    }

    Ok(())
}

pub fn cmd_subscriptions_usage(
    db: &Database,
    config: &EngineConfig,
    payee: &str,
    as_of: NaiveDate,
) -> Result<()> {
    let payee = resolve_payee(db, payee)?;
    let usage = SubscriptionEngine::new(db, config)
        .at(as_of)
        .analyze_usage(payee.id)?;

    println!();
    println!("📈 Usage of {}", payee.name);
    println!(
        "   Frequency {} │ Intensity {} │ Value {} │ Trend {}",
        percent(usage.frequency_score),
        percent(usage.intensity_score),
        percent(usage.value_score),
        percent(usage.trend_score)
    );
    println!(
        "   Overall {} ({} of ~{:.1} expected recent charges)",
        percent(usage.overall_score),
        usage.recent_charges,
        usage.expected_recent_charges
    );
    println!("   {}", usage.summary);

    Ok(())
}
