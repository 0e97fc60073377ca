//! Collaborator contracts consumed by the intelligence engine
//!
//! The engine never talks to storage directly; it is handed implementations
//! of these traits. [`crate::db::Database`] implements all of them.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{
    Category, CategoryCorrection, IntelligenceFilters, IntelligenceProfile, LifecycleEvent,
    NewCategoryCorrection, NewLifecycleEvent, NewPredictionFeedback, Payee, PredictionFeedback,
    PredictionType, Transaction,
};

/// Payee lookup
pub trait PayeeSource: Send + Sync {
    fn payee(&self, payee_id: i64) -> Result<Option<Payee>>;

    fn list_payees(&self) -> Result<Vec<Payee>>;
}

/// Filtered transaction history for a payee
pub trait TransactionSource: Send + Sync {
    /// Transactions matching `filters`, ordered by date ascending
    ///
    /// Relative date ranges are resolved against `as_of`. An empty history is `Ok(vec![])`.
    fn query(
        &self,
        payee_id: i64,
        filters: &IntelligenceFilters,
        as_of: NaiveDate,
    ) -> Result<Vec<Transaction>>;
}

/// Category lookup and validation
pub trait CategorySource: Send + Sync {
    fn exists(&self, category_id: i64) -> Result<bool>;

    fn category(&self, category_id: i64) -> Result<Option<Category>>;
}

/// Per-payee intelligence profiles
pub trait ProfileStore: Send + Sync {
    fn get(&self, payee_id: i64) -> Result<Option<IntelligenceProfile>>;

    fn put(&self, payee_id: i64, profile: &IntelligenceProfile) -> Result<()>;
}

/// Append-only feedback on past predictions
pub trait FeedbackStore: Send + Sync {
    fn record_feedback(&self, feedback: &NewPredictionFeedback) -> Result<i64>;

    /// Feedback for a payee, oldest first
    fn list_feedback(
        &self,
        payee_id: i64,
        prediction_type: Option<PredictionType>,
    ) -> Result<Vec<PredictionFeedback>>;
}

/// Append-only category correction log
pub trait CorrectionStore: Send + Sync {
    /// Append a correction; `recorded_at` defaults to now
    fn append(
        &self,
        correction: &NewCategoryCorrection,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<i64>;

    /// Corrections for a payee ordered by `created_at`
    fn query(&self, payee_id: i64) -> Result<Vec<CategoryCorrection>>;

    /// Payees with at least `min_corrections` corrections recorded since `since`
    fn qualifying_payees(&self, min_corrections: usize, since: DateTime<Utc>) -> Result<Vec<i64>>;
}

/// Append-only subscription lifecycle log
pub trait LifecycleStore: Send + Sync {
    fn append_event(&self, event: &NewLifecycleEvent) -> Result<i64>;

    /// Events for a payee ordered by date, then insertion order
    fn events(&self, payee_id: i64) -> Result<Vec<LifecycleEvent>>;
}
