//! Database tests

use super::*;
use crate::models::*;
use crate::sources::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rusqlite::params;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_tx(db: &Database, payee_id: i64, on: NaiveDate, amount: Option<f64>) -> i64 {
        db.insert_transaction(&NewTransaction {
            payee_id,
            date: on,
            amount,
            category_id: None,
            is_transfer: false,
        })
        .unwrap()
    }

    fn transactions(db: &Database, payee_id: i64, filters: &IntelligenceFilters, as_of: NaiveDate) -> Vec<Transaction> {
        TransactionSource::query(db, payee_id, filters, as_of).unwrap()
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_payees().unwrap().is_empty());
        assert!(db.list_categories().unwrap().is_empty());
    }

    #[test]
    fn test_schema_exists() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('category_corrections') WHERE name IN ('payee_id', 'from_category_id', 'to_category_id', 'user_confidence', 'correction_trigger', 'transaction_amount', 'temporal_context', 'created_at')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 8, "category_corrections should have 8 expected columns");

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('payees', 'categories', 'transactions', 'intelligence_profiles', 'prediction_feedback', 'subscription_lifecycle_events')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 6);
    }

    #[test]
    fn test_payee_crud() {
        let db = Database::in_memory().unwrap();
        let groceries = db.create_category("Groceries", CategoryType::Expense).unwrap();
        let id = db.create_payee("  Trader Joe's ").unwrap();

        let payee = db.payee(id).unwrap().unwrap();
        assert_eq!(payee.name, "Trader Joe's");
        assert_eq!(payee.default_category_id, None);
        assert!(!payee.is_subscription);

        db.set_default_category(id, Some(groceries)).unwrap();
        let payee = db.get_payee_by_name("trader joe's").unwrap().unwrap();
        assert_eq!(payee.default_category_id, Some(groceries));

        assert!(db.payee(999).unwrap().is_none());
        assert!(db.create_payee("   ").is_err());
        assert!(db.create_payee("Trader Joe's").is_err(), "names are unique");
    }

    #[test]
    fn test_set_default_category_not_found() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Shell").unwrap();
        assert!(db.set_default_category(payee, Some(42)).unwrap_err().is_not_found());
        assert!(db.set_default_category(999, None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mark_subscription_stores_metadata() {
        let db = Database::in_memory().unwrap();
        let id = db.create_payee("Netflix").unwrap();
        let metadata = SubscriptionMetadata {
            is_subscription: true,
            subscription_type: SubscriptionType::Entertainment,
            billing_cycle: Some(BillingCycle::Monthly),
            base_cost: 15.99,
            currency: "USD".into(),
            auto_renewal: true,
        };
        db.mark_subscription(id, Some(&metadata)).unwrap();

        let payee = db.payee(id).unwrap().unwrap();
        assert!(payee.is_subscription);
        assert_eq!(payee.subscription, Some(metadata));
    }

    #[test]
    fn test_categories() {
        let db = Database::in_memory().unwrap();
        let salary = db.create_category("Salary", CategoryType::Income).unwrap();
        db.create_category("Dining", CategoryType::Expense).unwrap();

        assert!(db.exists(salary).unwrap());
        assert!(!db.exists(salary + 100).unwrap());
        assert_eq!(
            db.category(salary).unwrap().unwrap().category_type,
            CategoryType::Income
        );
        let names: Vec<String> = db.list_categories().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Dining", "Salary"]);
    }

    #[test]
    fn test_insert_transaction_requires_payee() {
        let db = Database::in_memory().unwrap();
        let result = db.insert_transaction(&NewTransaction {
            payee_id: 7,
            date: date(2024, 1, 1),
            amount: Some(-5.0),
            category_id: None,
            is_transfer: false,
        });
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_orders_by_date() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Cafe").unwrap();
        add_tx(&db, payee, date(2024, 3, 1), Some(-3.0));
        add_tx(&db, payee, date(2024, 1, 1), Some(-1.0));
        add_tx(&db, payee, date(2024, 2, 1), Some(-2.0));

        let txs = transactions(&db, payee, &IntelligenceFilters::default(), date(2024, 6, 1));
        let amounts: Vec<f64> = txs.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_query_empty_history() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Nobody").unwrap();
        assert!(transactions(&db, payee, &IntelligenceFilters::default(), date(2024, 1, 1)).is_empty());
    }

    #[test]
    fn test_missing_and_corrupt_amounts_read_as_zero() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Glitchy").unwrap();
        add_tx(&db, payee, date(2024, 1, 1), None);
        add_tx(&db, payee, date(2024, 1, 2), Some(f64::NAN));
        add_tx(&db, payee, date(2024, 1, 3), Some(f64::INFINITY));
        add_tx(&db, payee, date(2024, 1, 4), Some(-4.0));

        let all = transactions(&db, payee, &IntelligenceFilters::default(), date(2024, 2, 1));
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|t| t.amount.is_finite()));
        assert_eq!(all[0].amount, 0.0);
        assert_eq!(all[1].amount, 0.0);
        assert_eq!(all[2].amount, 0.0);

        // sanitized zeros never match a sign filter
        let negative = IntelligenceFilters {
            amount_sign: AmountSign::Negative,
            ..Default::default()
        };
        assert_eq!(transactions(&db, payee, &negative, date(2024, 2, 1)).len(), 1);
    }

    #[test]
    fn test_query_applies_every_filter() {
        let db = Database::in_memory().unwrap();
        let income = db.create_category("Refunds", CategoryType::Income).unwrap();
        let expense = db.create_category("Fuel", CategoryType::Expense).unwrap();
        let payee = db.create_payee("Shell").unwrap();

        let rows = [
            (date(2023, 1, 10), -50.0, Some(expense), false),
            (date(2024, 4, 10), -45.0, Some(expense), false),
            (date(2024, 5, 10), -400.0, Some(expense), false),
            (date(2024, 5, 12), 20.0, Some(income), false),
            (date(2024, 5, 14), -60.0, None, false),
            (date(2024, 5, 20), -100.0, Some(expense), true),
            (date(2024, 7, 1), -55.0, Some(expense), false),
        ];
        for (on, amount, category_id, is_transfer) in rows {
            db.insert_transaction(&NewTransaction {
                payee_id: payee,
                date: on,
                amount: Some(amount),
                category_id,
                is_transfer,
            })
            .unwrap();
        }

        let as_of = date(2024, 6, 1);
        let filters = IntelligenceFilters {
            category_types: vec![CategoryType::Expense],
            amount_sign: AmountSign::Negative,
            date_range: DateRangeFilter::last_months(6),
            exclude_transfers: true,
            min_amount: Some(10.0),
            max_amount: Some(200.0),
            prediction_method: PredictionMethodSetting::Default,
        };
        let txs = transactions(&db, payee, &filters, as_of);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].date, date(2024, 4, 10));
        assert_eq!(db.count_transactions(payee, &filters, as_of).unwrap(), 1);

        // The SQL filter agrees with the in-memory predicate
        let everything = transactions(&db, payee, &IntelligenceFilters::default(), as_of);
        let category_type = |t: &Transaction| {
            t.category_id
                .and_then(|id| db.category(id).unwrap())
                .map(|c| c.category_type)
        };
        let expected: Vec<i64> = everything
            .iter()
            .filter(|t| filters.matches(t, category_type(t), as_of))
            .map(|t| t.id)
            .collect();
        assert_eq!(txs.iter().map(|t| t.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_relative_range_excludes_future() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Utility").unwrap();
        add_tx(&db, payee, date(2023, 12, 31), Some(-10.0));
        add_tx(&db, payee, date(2024, 3, 1), Some(-10.0));
        add_tx(&db, payee, date(2024, 9, 1), Some(-10.0));

        let filters = IntelligenceFilters {
            date_range: DateRangeFilter::last_years(1),
            ..Default::default()
        };
        let txs = transactions(&db, payee, &filters, date(2024, 6, 1));
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].date, date(2024, 3, 1));
    }

    #[test]
    fn test_profile_round_trip() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Gym").unwrap();
        assert!(db.get(payee).unwrap().is_none());

        let profile = IntelligenceProfile {
            enabled: true,
            filters: IntelligenceFilters {
                category_types: vec![CategoryType::Expense, CategoryType::Savings],
                amount_sign: AmountSign::Negative,
                date_range: DateRangeFilter::last_months(12),
                exclude_transfers: true,
                min_amount: Some(1.5),
                max_amount: None,
                prediction_method: PredictionMethodSetting::Ml,
            },
            confidence_threshold: Some(0.4),
        };
        db.put(payee, &profile).unwrap();
        assert_eq!(db.get(payee).unwrap(), Some(profile.clone()));

        let disabled = IntelligenceProfile::default();
        db.put(payee, &disabled).unwrap();
        assert_eq!(db.get(payee).unwrap(), Some(disabled));
    }

    #[test]
    fn test_profile_tolerates_unknown_and_missing_keys() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Legacy").unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "INSERT INTO intelligence_profiles (payee_id, profile) VALUES (?, ?)",
                params![payee, r#"{"enabled":true,"filters":{"amountSign":"negative","legacyFlag":1}}"#],
            )
            .unwrap();
        }

        let profile = db.get(payee).unwrap().unwrap();
        assert!(profile.enabled);
        assert_eq!(profile.filters.amount_sign, AmountSign::Negative);
        assert_eq!(profile.filters.date_range, DateRangeFilter::default());
        assert!(profile.filters.category_types.is_empty());
    }

    #[test]
    fn test_feedback_append_and_filter() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Water").unwrap();

        db.record_feedback(&NewPredictionFeedback {
            payee_id: payee,
            prediction_type: PredictionType::NextTransaction,
            original_value: 40.0,
            corrected_value: Some(42.0),
            rating: None,
        })
        .unwrap();
        db.record_feedback(&NewPredictionFeedback {
            payee_id: payee,
            prediction_type: PredictionType::BudgetSuggestion,
            original_value: 80.0,
            corrected_value: None,
            rating: Some(4),
        })
        .unwrap();

        assert_eq!(db.list_feedback(payee, None).unwrap().len(), 2);
        let budget = db
            .list_feedback(payee, Some(PredictionType::BudgetSuggestion))
            .unwrap();
        assert_eq!(budget.len(), 1);
        assert_eq!(budget[0].rating, Some(4));
        assert_eq!(budget[0].corrected_value, None);
    }

    #[test]
    fn test_corrections_ordered_and_temporal_context() {
        let db = Database::in_memory().unwrap();
        let a = db.create_category("A", CategoryType::Expense).unwrap();
        let b = db.create_category("B", CategoryType::Expense).unwrap();
        let payee = db.create_payee("Market").unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let correction = |to: i64| NewCategoryCorrection {
            payee_id: payee,
            from_category_id: Some(a),
            to_category_id: to,
            user_confidence: 8,
            trigger: CorrectionTrigger::BulkEdit,
            transaction_amount: Some(-12.5),
            transaction_date: Some(date(2024, 4, 27)),
        };
        db.append(&correction(b), Some(base + Duration::days(2))).unwrap();
        db.append(&correction(b), Some(base)).unwrap();

        let log = CorrectionStore::query(&db, payee).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].created_at < log[1].created_at);
        assert_eq!(log[0].created_at, base);
        assert_eq!(log[0].trigger, CorrectionTrigger::BulkEdit);
        let context = log[0].temporal_context.unwrap();
        assert!(context.is_weekend, "2024-04-27 is a Saturday");
        assert_eq!(context.month, 4);
    }

    #[test]
    fn test_qualifying_payees_having_clause() {
        let db = Database::in_memory().unwrap();
        let a = db.create_category("A", CategoryType::Expense).unwrap();
        let b = db.create_category("B", CategoryType::Expense).unwrap();
        let busy = db.create_payee("Busy").unwrap();
        let quiet = db.create_payee("Quiet").unwrap();
        let stale = db.create_payee("Stale").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let append = |payee_id: i64, days_ago: i64| {
            db.append(
                &NewCategoryCorrection {
                    payee_id,
                    from_category_id: Some(a),
                    to_category_id: b,
                    user_confidence: 7,
                    trigger: CorrectionTrigger::ManualEdit,
                    transaction_amount: None,
                    transaction_date: None,
                },
                Some(now - Duration::days(days_ago)),
            )
            .unwrap();
        };
        for days in [1, 5, 10] {
            append(busy, days);
        }
        for days in [1, 2] {
            append(quiet, days);
        }
        for days in [200, 210, 220] {
            append(stale, days);
        }

        let qualifying = db.qualifying_payees(3, now - Duration::days(90)).unwrap();
        assert_eq!(qualifying, vec![busy]);
    }

    #[test]
    fn test_lifecycle_events_ordered() {
        let db = Database::in_memory().unwrap();
        let payee = db.create_payee("Hulu").unwrap();

        for (status, on) in [
            (SubscriptionStatus::Active, date(2024, 2, 1)),
            (SubscriptionStatus::Trial, date(2024, 1, 1)),
            (SubscriptionStatus::Paused, date(2024, 2, 1)),
        ] {
            db.append_event(&NewLifecycleEvent {
                payee_id: payee,
                status,
                date: on,
                note: None,
            })
            .unwrap();
        }

        let statuses: Vec<SubscriptionStatus> =
            db.events(payee).unwrap().into_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                SubscriptionStatus::Trial,
                SubscriptionStatus::Active,
                SubscriptionStatus::Paused
            ]
        );
    }
}
