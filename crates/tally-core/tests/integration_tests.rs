//! Integration tests for tally-core
//!
//! These tests exercise the full record → analyze → predict workflow through the
//! public API, against a real (unencrypted, temporary) database.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tally_core::{
    ai::{AIClient, AiRefinement, MockBackend},
    categories::NO_HISTORY_CONFIDENCE,
    config::EngineConfig,
    db::Database,
    intelligence::{PredictionMethod, ReportDelta},
    models::{
        AmountSign, CategoryType, CorrectionTrigger, DateRangeFilter, Frequency,
        IntelligenceFilters, IntelligenceProfile, NewCategoryCorrection, NewLifecycleEvent,
        NewPredictionFeedback, NewTransaction, PredictionMethodSetting, PredictionType,
        SubscriptionStatus, SubscriptionType, TrendDirection,
    },
    sources::{PayeeSource, ProfileStore},
    CategoryLearningEngine, IntelligenceService, SubscriptionEngine,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn add(db: &Database, payee_id: i64, on: NaiveDate, amount: f64) {
    db.insert_transaction(&NewTransaction {
        payee_id,
        date: on,
        amount: Some(amount),
        category_id: None,
        is_transfer: false,
    })
    .expect("Failed to insert transaction");
}

/// Netflix charged $15.99 on the 15th for six months (Jan-Jun 2024)
fn seed_netflix(db: &Database) -> i64 {
    let payee_id = db.create_payee("Netflix").expect("Failed to create payee");
    for m in 1..=6 {
        add(db, payee_id, date(2024, m, 15), -15.99);
    }
    payee_id
}

// =============================================================================
// Intelligence Service
// =============================================================================

#[tokio::test]
async fn test_monthly_payee_report() {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let config = EngineConfig::default();
    let payee_id = db.create_payee("City Power").unwrap();
    for (m, amount) in [(1, -98.0), (2, -101.0), (3, -100.0), (4, -99.5), (5, -101.5)] {
        add(&db, payee_id, date(2024, m, 1), amount);
    }

    let service = IntelligenceService::new(&db, &config);
    let report = service.analyze(payee_id, date(2024, 5, 20)).await.unwrap();

    assert_eq!(report.frequency.detected_frequency, Some(Frequency::Monthly));
    assert!((report.frequency.average_days_between - 30.25).abs() < 1e-9);
    assert!(report.frequency.regularity_score > 0.8);

    let stats = &report.statistics;
    assert_eq!(stats.transaction_count, 5);
    assert!(stats.min_amount <= stats.median_amount && stats.median_amount <= stats.max_amount);
    assert!(stats.standard_deviation >= 0.0);
    assert_eq!(stats.trend_direction, TrendDirection::Stable);

    let next = &report.next_transaction;
    assert_ne!(next.method, PredictionMethod::InsufficientData);
    assert!(next.amount > 95.0 && next.amount < 105.0);
    assert!(next.date.is_some_and(|d| d > date(2024, 5, 1)));
    assert!((0.0..=1.0).contains(&report.confidence.overall));
    assert!(report.budget.total_suggested > 0.0);
}

#[tokio::test]
async fn test_weekly_payee_pattern() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = db.create_payee("Farmers Market").unwrap();
    let start = date(2024, 3, 2);
    for week in 0..5 {
        add(&db, payee_id, start + Duration::days(7 * week), -25.0);
    }

    let report = IntelligenceService::new(&db, &config)
        .analyze(payee_id, date(2024, 4, 6))
        .await
        .unwrap();

    assert_eq!(report.frequency.detected_frequency, Some(Frequency::Weekly));
    assert_eq!(report.frequency.intervals, vec![7, 7, 7, 7]);
    assert!(report.frequency.confidence > 0.5);
}

#[tokio::test]
async fn test_zero_transaction_payee() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = db.create_payee("Brand New Payee").unwrap();

    let report = IntelligenceService::new(&db, &config)
        .analyze(payee_id, date(2024, 6, 1))
        .await
        .unwrap();

    assert_eq!(report.statistics.transaction_count, 0);
    assert_eq!(report.statistics.average_amount, 0.0);
    assert_eq!(report.statistics.standard_deviation, 0.0);
    assert_eq!(report.frequency.detected_frequency, None);
    assert_eq!(report.frequency.confidence, 0.0);
    assert_eq!(
        report.next_transaction.method,
        PredictionMethod::InsufficientData
    );
}

#[tokio::test]
async fn test_corrupt_amounts_never_surface() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = db.create_payee("Flaky Import").unwrap();
    add(&db, payee_id, date(2024, 1, 1), -40.0);
    add(&db, payee_id, date(2024, 2, 1), f64::NAN);
    add(&db, payee_id, date(2024, 3, 1), f64::INFINITY);
    db.insert_transaction(&NewTransaction {
        payee_id,
        date: date(2024, 4, 1),
        amount: None,
        category_id: None,
        is_transfer: false,
    })
    .unwrap();

    let report = IntelligenceService::new(&db, &config)
        .analyze(payee_id, date(2024, 5, 1))
        .await
        .unwrap();

    assert_eq!(report.statistics.transaction_count, 4);
    assert!((report.statistics.total_amount.abs() - 40.0).abs() < 1e-9);
    assert!(report.next_transaction.amount.is_finite());
    assert!(report.next_transaction.amount_range.iter().all(|v| v.is_finite()));
    assert!(report.confidence.overall.is_finite());
    assert!(report.budget.total_suggested.is_finite());
}

#[tokio::test]
async fn test_profile_round_trip_and_filtering() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = db.create_payee("Corner Deli").unwrap();
    add(&db, payee_id, date(2023, 1, 10), -12.0);
    add(&db, payee_id, date(2024, 4, 10), -11.0);
    add(&db, payee_id, date(2024, 5, 10), -13.0);
    add(&db, payee_id, date(2024, 5, 11), 13.0);

    let profile = IntelligenceProfile {
        enabled: true,
        filters: IntelligenceFilters {
            amount_sign: AmountSign::Negative,
            date_range: DateRangeFilter::last_months(6),
            prediction_method: PredictionMethodSetting::Statistical,
            ..Default::default()
        },
        confidence_threshold: Some(0.2),
    };
    let service = IntelligenceService::new(&db, &config);
    service.update_profile(payee_id, &profile).unwrap();
    assert_eq!(db.get(payee_id).unwrap(), Some(profile.clone()));

    let report = service.analyze(payee_id, date(2024, 6, 1)).await.unwrap();
    assert_eq!(report.profile, profile);
    assert_eq!(report.statistics.transaction_count, 2);
    assert_eq!(report.next_transaction.tier, tally_core::PredictionTier::Statistical);

    let invalid = IntelligenceProfile {
        confidence_threshold: Some(1.5),
        ..profile
    };
    assert!(service.update_profile(payee_id, &invalid).is_err());
}

#[tokio::test]
async fn test_snapshots_are_diffed_not_mutated() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = db.create_payee("Water Utility").unwrap();
    for m in 1..=4 {
        add(&db, payee_id, date(2024, m, 5), -60.0);
    }
    let service = IntelligenceService::new(&db, &config);

    let before = service.analyze(payee_id, date(2024, 6, 1)).await.unwrap();
    let again = service.analyze(payee_id, date(2024, 6, 1)).await.unwrap();
    assert!(ReportDelta::between(&before, &again).is_unchanged());

    add(&db, payee_id, date(2024, 5, 5), -90.0);
    let after = service.analyze(payee_id, date(2024, 6, 1)).await.unwrap();
    let delta = ReportDelta::between(&before, &after);
    assert_eq!(delta.transaction_count_change, 1);
    assert!(delta.average_amount_change.abs() > 0.0);
    assert_eq!(before.statistics.transaction_count, 4);
}

#[tokio::test]
async fn test_feedback_is_validated_and_recorded() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = seed_netflix(&db);
    let service = IntelligenceService::new(&db, &config);

    let feedback = NewPredictionFeedback {
        payee_id,
        prediction_type: PredictionType::NextTransaction,
        original_value: 15.99,
        corrected_value: Some(15.99),
        rating: Some(5),
    };
    service.record_feedback(&feedback).unwrap();

    let bad_rating = NewPredictionFeedback {
        rating: Some(9),
        ..feedback.clone()
    };
    assert!(service.record_feedback(&bad_rating).is_err());

    let unknown = NewPredictionFeedback {
        payee_id: 404,
        ..feedback
    };
    assert!(service.record_feedback(&unknown).unwrap_err().is_not_found());

    let report = service.analyze(payee_id, date(2024, 7, 1)).await.unwrap();
    assert!(report.confidence.has_feedback);
}

#[tokio::test]
async fn test_ai_tier_refines_then_falls_back() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = seed_netflix(&db);
    let service = IntelligenceService::new(&db, &config);
    service
        .update_profile(
            payee_id,
            &IntelligenceProfile {
                enabled: false,
                filters: IntelligenceFilters {
                    prediction_method: PredictionMethodSetting::Ai,
                    ..Default::default()
                },
                confidence_threshold: None,
            },
        )
        .unwrap();

    let ai = AIClient::Mock(MockBackend::with_refinement(AiRefinement {
        amount: Some(17.99),
        days_until_next: None,
        confidence: None,
        explanation: "Plan price went up".into(),
    }));
    let refined = IntelligenceService::new(&db, &config)
        .with_ai(Some(&ai))
        .predict_next(payee_id, date(2024, 7, 1))
        .await
        .unwrap();
    assert_eq!(refined.method, PredictionMethod::Ai);
    assert!((refined.amount - 17.99).abs() < 1e-9);
    assert_eq!(refined.explanation.as_deref(), Some("Plan price went up"));

    let down = AIClient::Mock(MockBackend::unhealthy());
    let fallback = IntelligenceService::new(&db, &config)
        .with_ai(Some(&down))
        .predict_next(payee_id, date(2024, 7, 1))
        .await
        .unwrap();
    assert_eq!(fallback.method, PredictionMethod::Ml);
}

// =============================================================================
// Category Learning
// =============================================================================

#[tokio::test]
async fn test_corrections_drive_recommendation() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let dining = db.create_category("Dining", CategoryType::Expense).unwrap();
    let groceries = db.create_category("Groceries", CategoryType::Expense).unwrap();
    let payee_id = db.create_payee("Whole Foods").unwrap();
    db.set_default_category(payee_id, Some(dining)).unwrap();

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let engine = CategoryLearningEngine::new(&db, &config.categories).at(now);

    let baseline = engine.get_category_recommendations(payee_id).unwrap();
    assert_eq!(baseline.recommended_category_id, Some(dining));
    assert!((baseline.confidence - NO_HISTORY_CONFIDENCE).abs() < 1e-9);

    for days_ago in [20, 10, 2] {
        engine
            .record_correction(
                &NewCategoryCorrection {
                    payee_id,
                    from_category_id: Some(dining),
                    to_category_id: groceries,
                    user_confidence: 9,
                    trigger: CorrectionTrigger::ManualEdit,
                    transaction_amount: Some(-84.20),
                    transaction_date: Some(date(2024, 5, 1)),
                },
                Some(now - Duration::days(days_ago)),
            )
            .unwrap();
    }

    let recommendation = engine.get_category_recommendations(payee_id).unwrap();
    assert_eq!(recommendation.recommended_category_id, Some(groceries));
    assert!(recommendation.confidence > NO_HISTORY_CONFIDENCE + 0.3);

    let patterns = engine.analyze_correction_patterns(payee_id).unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 3);

    assert_eq!(
        engine.calculate_category_confidence(payee_id, dining).unwrap(),
        0.0
    );

    let suggestions = engine.suggest_default_category_updates().await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].payee_id, payee_id);
    assert_eq!(suggestions[0].suggested_category_id, groceries);
    assert_eq!(suggestions[0].current_category_id, Some(dining));
}

#[test]
fn test_correction_validation() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let a = db.create_category("A", CategoryType::Expense).unwrap();
    let payee_id = db.create_payee("Somewhere").unwrap();
    let engine = CategoryLearningEngine::new(&db, &config.categories);

    let correction = NewCategoryCorrection {
        payee_id,
        from_category_id: None,
        to_category_id: 999,
        user_confidence: 5,
        trigger: CorrectionTrigger::ManualEdit,
        transaction_amount: None,
        transaction_date: None,
    };
    assert!(engine.record_correction(&correction, None).unwrap_err().is_not_found());

    let too_confident = NewCategoryCorrection {
        to_category_id: a,
        user_confidence: 11,
        ..correction.clone()
    };
    assert!(engine.record_correction(&too_confident, None).is_err());

    let unknown_payee = NewCategoryCorrection {
        payee_id: 404,
        to_category_id: a,
        ..correction
    };
    assert!(engine
        .record_correction(&unknown_payee, None)
        .unwrap_err()
        .is_not_found());
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_netflix_detected_as_subscription() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let netflix = seed_netflix(&db);

    let grocer = db.create_payee("Neighborhood Grocer").unwrap();
    for (day, amount) in [(3, -54.10), (9, -12.75), (24, -140.0), (41, -33.0), (45, -9.99)] {
        add(&db, grocer, date(2024, 1, 1) + Duration::days(day), amount);
    }

    let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 7, 1));
    let payees = db.list_payees().unwrap();
    let detected = engine.detect_subscriptions(&payees).unwrap();

    let hit = detected
        .iter()
        .find(|c| c.payee_id == netflix)
        .expect("Netflix should be detected");
    assert!(hit.detection_confidence > 0.3);
    assert_eq!(hit.subscription_type, SubscriptionType::Entertainment);
    assert!(detected.iter().all(|c| c.detection_confidence >= 0.3));
    assert!(detected.iter().all(|c| c.payee_id != grocer));

    let scanned = engine.scan_subscriptions().await.unwrap();
    assert_eq!(scanned, detected);

    // Confirmed subscriptions are not re-detected
    db.mark_subscription(netflix, Some(&hit.suggested_metadata)).unwrap();
    let payees = db.list_payees().unwrap();
    assert!(engine
        .detect_subscriptions(&payees)
        .unwrap()
        .iter()
        .all(|c| c.payee_id != netflix));
}

#[test]
fn test_subscription_lifecycle_and_costs() {
    let db = Database::in_memory().unwrap();
    let config = EngineConfig::default();
    let payee_id = seed_netflix(&db);
    add(&db, payee_id, date(2024, 7, 15), -17.99);

    let engine = SubscriptionEngine::new(&db, &config).at(date(2024, 7, 20));

    let lifecycle = engine.track_subscription_lifecycle(payee_id).unwrap();
    assert_eq!(lifecycle.current_status, Some(SubscriptionStatus::Active));
    assert!((0.0..=1.0).contains(&lifecycle.cancellation_probability));

    let costs = engine.analyze_costs(payee_id).unwrap();
    assert!((costs.current_cost - 17.99).abs() < 1e-9);
    assert!((costs.original_cost - 15.99).abs() < 1e-9);
    assert!(costs.price_increase_alert);
    assert_eq!(costs.price_changes.len(), 1);

    let renewals = engine.predict_renewals(payee_id, 3).unwrap();
    assert_eq!(renewals.len(), 3);
    assert_eq!(renewals[0].date, date(2024, 8, 15));
    assert!(renewals.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    let capped = engine.predict_renewals(payee_id, usize::MAX).unwrap();
    assert_eq!(capped.len(), tally_core::subscriptions::MAX_RENEWALS);

    let usage = engine.analyze_usage(payee_id).unwrap();
    for score in [
        usage.frequency_score,
        usage.intensity_score,
        usage.value_score,
        usage.trend_score,
        usage.overall_score,
    ] {
        assert!((0.0..=1.0).contains(&score));
    }

    engine
        .record_lifecycle_event(&NewLifecycleEvent {
            payee_id,
            status: SubscriptionStatus::Cancelled,
            date: date(2024, 7, 18),
            note: Some("Cancelled online".into()),
        })
        .unwrap();
    let lifecycle = engine.track_subscription_lifecycle(payee_id).unwrap();
    assert_eq!(lifecycle.current_status, Some(SubscriptionStatus::Cancelled));
    assert_eq!(lifecycle.cancellation_probability, 1.0);
    assert!(engine.predict_renewals(payee_id, 3).unwrap().is_empty());
}
