//! Domain models for Tally

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::sanitize;

/// A payee (merchant, person or institution on the other side of a transaction)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payee {
    pub id: i64,
    pub name: String,
    /// Category the budgeting layer assigns to new transactions for this payee
    pub default_category_id: Option<i64>,
    /// Set once a subscription has been confirmed for this payee
    pub is_subscription: bool,
    /// Confirmed subscription metadata (if any)
    pub subscription: Option<SubscriptionMetadata>,
    pub created_at: DateTime<Utc>,
}

/// Category types used by profile filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Expense,
    Income,
    Transfer,
    Savings,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
            Self::Savings => "savings",
        }
    }
}

impl std::str::FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            "savings" => Ok(Self::Savings),
            _ => Err(format!("Unknown category type: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A budget category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub category_type: CategoryType,
}

/// A transaction as seen by the engine
///
/// Amount is signed (negative = expense) and always finite: corrupt values
/// are replaced with 0 when the transaction is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub payee_id: i64,
    pub date: NaiveDate,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub is_transfer: bool,
}

impl Transaction {
    /// Build a transaction, sanitizing the raw amount
    pub fn new(id: i64, payee_id: i64, date: NaiveDate, amount: Option<f64>) -> Self {
        Self {
            id,
            payee_id,
            date,
            amount: amount.map(sanitize).unwrap_or(0.0),
            category_id: None,
            is_transfer: false,
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Absolute amount, used by every spending statistic
    pub fn magnitude(&self) -> f64 {
        self.amount.abs()
    }
}

/// Input for inserting a transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub payee_id: i64,
    pub date: NaiveDate,
    /// Raw amount; `None` or non-finite values are stored as-is and sanitized on read
    pub amount: Option<f64>,
    pub category_id: Option<i64>,
    pub is_transfer: bool,
}

/// Recurrence interval detected from transaction gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Annual,
    Irregular,
}

impl Frequency {
    /// Periodic frequencies in ascending interval order
    pub const CANONICAL: [Frequency; 6] = [
        Self::Daily,
        Self::Weekly,
        Self::BiWeekly,
        Self::Monthly,
        Self::Quarterly,
        Self::Annual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi_weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
            Self::Irregular => "irregular",
        }
    }

    /// Nominal interval in days (None for irregular)
    pub fn canonical_days(&self) -> Option<f64> {
        match self {
            Self::Daily => Some(1.0),
            Self::Weekly => Some(7.0),
            Self::BiWeekly => Some(14.0),
            Self::Monthly => Some(30.0),
            Self::Quarterly => Some(90.0),
            Self::Annual => Some(365.0),
            Self::Irregular => None,
        }
    }

    /// Expected occurrences in an average month (None for irregular)
    pub fn occurrences_per_month(&self) -> Option<f64> {
        self.canonical_days().map(|days| AVERAGE_MONTH_DAYS / days)
    }
}

/// Average Gregorian month length in days
pub const AVERAGE_MONTH_DAYS: f64 = 30.44;

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "bi_weekly" | "biweekly" => Ok(Self::BiWeekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annual" | "yearly" => Ok(Self::Annual),
            "irregular" => Ok(Self::Irregular),
            _ => Err(format!("Unknown frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a spending or cost trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }

    /// +1, -1 or 0
    pub fn sign(&self) -> f64 {
        match self {
            Self::Increasing => 1.0,
            Self::Decreasing => -1.0,
            Self::Stable => 0.0,
        }
    }
}

// =============================================================================
// Intelligence profile
// =============================================================================

/// Which amount signs feed the analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSign {
    #[default]
    All,
    Positive,
    Negative,
}

/// Kind of date window applied to a payee's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRangeType {
    #[default]
    All,
    LastNMonths,
    LastNYears,
}

/// Date window filter
///
/// `months` carries N for both relative kinds: N months for `last_n_months`,
/// N years for `last_n_years`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRangeFilter {
    #[serde(rename = "type")]
    pub range_type: DateRangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<u32>,
}

impl DateRangeFilter {
    pub fn last_months(n: u32) -> Self {
        Self {
            range_type: DateRangeType::LastNMonths,
            months: Some(n),
        }
    }

    pub fn last_years(n: u32) -> Self {
        Self {
            range_type: DateRangeType::LastNYears,
            months: Some(n),
        }
    }

    /// Earliest date included relative to `as_of` (None = unbounded)
    pub fn start_date(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        let n = self.months?;
        let months = match self.range_type {
            DateRangeType::All => return None,
            DateRangeType::LastNMonths => n,
            DateRangeType::LastNYears => n.saturating_mul(12),
        };
        as_of.checked_sub_months(Months::new(months))
    }
}

/// Prediction tier requested by a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethodSetting {
    /// Use the workspace-wide default from the engine config
    #[default]
    Default,
    Statistical,
    Ml,
    Ai,
}

/// Filters restricting which transactions feed the analyzers
///
/// Omitted keys deserialize to "no filter on this dimension"; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntelligenceFilters {
    /// Only include transactions whose category has one of these types (empty = all)
    pub category_types: Vec<CategoryType>,
    pub amount_sign: AmountSign,
    pub date_range: DateRangeFilter,
    pub exclude_transfers: bool,
    /// Lower bound on the absolute amount
    pub min_amount: Option<f64>,
    /// Upper bound on the absolute amount
    pub max_amount: Option<f64>,
    pub prediction_method: PredictionMethodSetting,
}

impl IntelligenceFilters {
    /// Check a transaction against every filter dimension
    ///
    /// `category_type` is the type of the transaction's category, if it has one.
    pub fn matches(
        &self,
        tx: &Transaction,
        category_type: Option<CategoryType>,
        as_of: NaiveDate,
    ) -> bool {
        if !self.category_types.is_empty() {
            match category_type {
                Some(t) if self.category_types.contains(&t) => {}
                _ => return false,
            }
        }

        match self.amount_sign {
            AmountSign::All => {}
            AmountSign::Positive if tx.amount > 0.0 => {}
            AmountSign::Negative if tx.amount < 0.0 => {}
            _ => return false,
        }

        if let Some(start) = self.date_range.start_date(as_of) {
            if tx.date < start || tx.date > as_of {
                return false;
            }
        }

        if self.exclude_transfers && tx.is_transfer {
            return false;
        }

        let magnitude = tx.magnitude();
        if self.min_amount.is_some_and(|min| magnitude < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| magnitude > max) {
            return false;
        }

        true
    }
}

/// Per-payee intelligence configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntelligenceProfile {
    /// Disabled profiles are stored but their filters are not applied
    pub enabled: bool,
    pub filters: IntelligenceFilters,
    /// Minimum overall confidence the caller wants before surfacing predictions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

impl IntelligenceProfile {
    /// Filters that actually apply (defaults when the profile is disabled)
    pub fn effective_filters(&self) -> IntelligenceFilters {
        if self.enabled {
            self.filters.clone()
        } else {
            IntelligenceFilters {
                prediction_method: self.filters.prediction_method,
                ..Default::default()
            }
        }
    }

    /// Reject malformed configuration before it reaches the analyzers
    pub fn validate(&self) -> Result<()> {
        let filters = &self.filters;

        match filters.date_range.range_type {
            DateRangeType::All => {}
            DateRangeType::LastNMonths | DateRangeType::LastNYears => {
                match filters.date_range.months {
                    Some(n) if n > 0 => {}
                    _ => {
                        return Err(Error::Validation(
                            "dateRange.months must be a positive number for relative ranges"
                                .into(),
                        ))
                    }
                }
            }
        }

        for (name, bound) in [
            ("minAmount", filters.min_amount),
            ("maxAmount", filters.max_amount),
        ] {
            if let Some(value) = bound {
                if !value.is_finite() || value < 0.0 {
                    return Err(Error::Validation(format!(
                        "{} must be a finite, non-negative amount",
                        name
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (filters.min_amount, filters.max_amount) {
            if min > max {
                return Err(Error::Validation(format!(
                    "minAmount ({}) is greater than maxAmount ({})",
                    min, max
                )));
            }
        }

        if let Some(threshold) = self.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::Validation(format!(
                    "confidenceThreshold must be within [0, 1], got {}",
                    threshold
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Prediction feedback
// =============================================================================

/// Which prediction a piece of feedback refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    NextTransaction,
    BudgetSuggestion,
}

impl PredictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextTransaction => "next_transaction",
            Self::BudgetSuggestion => "budget_suggestion",
        }
    }
}

impl std::str::FromStr for PredictionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "next_transaction" | "next" => Ok(Self::NextTransaction),
            "budget_suggestion" | "budget" => Ok(Self::BudgetSuggestion),
            _ => Err(format!("Unknown prediction type: {}", s)),
        }
    }
}

/// Input for recording feedback on a past prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPredictionFeedback {
    pub payee_id: i64,
    pub prediction_type: PredictionType,
    /// The value the engine predicted
    pub original_value: f64,
    /// What actually happened / what the user corrected it to
    pub corrected_value: Option<f64>,
    /// 1 (useless) to 5 (spot on)
    pub rating: Option<u8>,
}

impl NewPredictionFeedback {
    pub fn validate(&self) -> Result<()> {
        if !self.original_value.is_finite() {
            return Err(Error::Validation("originalValue must be finite".into()));
        }
        if self.corrected_value.is_some_and(|v| !v.is_finite()) {
            return Err(Error::Validation("correctedValue must be finite".into()));
        }
        if self.rating.is_some_and(|r| !(1..=5).contains(&r)) {
            return Err(Error::Validation("rating must be between 1 and 5".into()));
        }
        if self.corrected_value.is_none() && self.rating.is_none() {
            return Err(Error::Validation(
                "feedback needs a correctedValue or a rating".into(),
            ));
        }
        Ok(())
    }
}

/// A persisted feedback record (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionFeedback {
    pub id: i64,
    pub payee_id: i64,
    pub prediction_type: PredictionType,
    pub original_value: f64,
    pub corrected_value: Option<f64>,
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Category corrections
// =============================================================================

/// What prompted the user to override a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionTrigger {
    #[default]
    ManualEdit,
    BulkEdit,
    ImportReview,
    SuggestionRejected,
}

impl CorrectionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualEdit => "manual_edit",
            Self::BulkEdit => "bulk_edit",
            Self::ImportReview => "import_review",
            Self::SuggestionRejected => "suggestion_rejected",
        }
    }
}

impl std::str::FromStr for CorrectionTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual_edit" | "manual" => Ok(Self::ManualEdit),
            "bulk_edit" | "bulk" => Ok(Self::BulkEdit),
            "import_review" | "import" => Ok(Self::ImportReview),
            "suggestion_rejected" => Ok(Self::SuggestionRejected),
            _ => Err(format!("Unknown correction trigger: {}", s)),
        }
    }
}

/// Calendar context of the corrected transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalContext {
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
}

impl TemporalContext {
    pub fn from_date(date: NaiveDate) -> Self {
        let weekday = date.weekday();
        Self {
            day_of_week: weekday.num_days_from_monday(),
            month: date.month(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
        }
    }
}

/// Input for appending a category correction
#[derive(Debug, Clone)]
pub struct NewCategoryCorrection {
    pub payee_id: i64,
    pub from_category_id: Option<i64>,
    pub to_category_id: i64,
    /// 0 (unsure) to 10 (certain)
    pub user_confidence: u8,
    pub trigger: CorrectionTrigger,
    pub transaction_amount: Option<f64>,
    /// Date of the corrected transaction (drives the temporal context)
    pub transaction_date: Option<NaiveDate>,
}

/// An entry of the append-only correction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCorrection {
    pub id: i64,
    pub payee_id: i64,
    pub from_category_id: Option<i64>,
    pub to_category_id: i64,
    pub user_confidence: u8,
    pub created_at: DateTime<Utc>,
    pub trigger: CorrectionTrigger,
    pub transaction_amount: Option<f64>,
    pub temporal_context: Option<TemporalContext>,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Paused,
    Cancelled,
    Expired,
    PendingCancellation,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::PendingCancellation => "pending_cancellation",
        }
    }

    /// Whether charges are expected to keep arriving
    pub fn is_billing(&self) -> bool {
        matches!(
            self,
            Self::Trial | Self::Active | Self::PendingCancellation
        )
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "pending_cancellation" => Ok(Self::PendingCancellation),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the append-only lifecycle log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: i64,
    pub payee_id: i64,
    pub status: SubscriptionStatus,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a lifecycle event
#[derive(Debug, Clone)]
pub struct NewLifecycleEvent {
    pub payee_id: i64,
    pub status: SubscriptionStatus,
    pub date: NaiveDate,
    pub note: Option<String>,
}

/// Kind of service a subscription pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Entertainment,
    Utilities,
    Software,
    Membership,
    Communication,
    Finance,
    Shopping,
    Health,
    Education,
    #[default]
    Other,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entertainment => "entertainment",
            Self::Utilities => "utilities",
            Self::Software => "software",
            Self::Membership => "membership",
            Self::Communication => "communication",
            Self::Finance => "finance",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Education => "education",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for SubscriptionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entertainment" => Ok(Self::Entertainment),
            "utilities" => Ok(Self::Utilities),
            "software" => Ok(Self::Software),
            "membership" => Ok(Self::Membership),
            "communication" => Ok(Self::Communication),
            "finance" => Ok(Self::Finance),
            "shopping" => Ok(Self::Shopping),
            "health" => Ok(Self::Health),
            "education" => Ok(Self::Education),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown subscription type: {}", s)),
        }
    }
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi_weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    /// Billing cycles only exist for periodic, non-daily frequencies
    pub fn from_frequency(frequency: Frequency) -> Option<Self> {
        match frequency {
            Frequency::Weekly => Some(Self::Weekly),
            Frequency::BiWeekly => Some(Self::BiWeekly),
            Frequency::Monthly => Some(Self::Monthly),
            Frequency::Quarterly => Some(Self::Quarterly),
            Frequency::Annual => Some(Self::Annual),
            Frequency::Daily | Frequency::Irregular => None,
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Self::Weekly => Frequency::Weekly,
            Self::BiWeekly => Frequency::BiWeekly,
            Self::Monthly => Frequency::Monthly,
            Self::Quarterly => Frequency::Quarterly,
            Self::Annual => Frequency::Annual,
        }
    }

    /// Number of billing cycles per calendar month (e.g. 1/12 for annual)
    pub fn cycles_per_month(&self) -> f64 {
        match self {
            Self::Weekly => 52.0 / 12.0,
            Self::BiWeekly => 26.0 / 12.0,
            Self::Monthly => 1.0,
            Self::Quarterly => 1.0 / 3.0,
            Self::Annual => 1.0 / 12.0,
        }
    }
}

/// Subscription metadata suggested by the engine or confirmed by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    pub is_subscription: bool,
    pub subscription_type: SubscriptionType,
    pub billing_cycle: Option<BillingCycle>,
    pub base_cost: f64,
    pub currency: String,
    pub auto_renewal: bool,
}
