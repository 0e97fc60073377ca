//! Tally Core Library
//!
//! Payee intelligence for the Tally budgeting tool:
//! - Database access and migrations (SQLCipher encrypted at rest)
//! - Spending, frequency and seasonality analysis per payee
//! - Next-transaction predictions and budget suggestions with explainable confidence
//! - Category learning from user corrections
//! - Subscription detection, lifecycle tracking and cost analysis
//! - Pluggable local AI backends for the optional `ai` prediction tier

pub mod ai;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod intelligence;
pub mod models;
pub mod sources;
pub mod stats;
pub mod subscriptions;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, AiRefinement, MockBackend, OllamaBackend, PredictionContext};
pub use categories::{
    CategoryDrift, CategoryLearningEngine, CategoryRecommendation, CorrectionPattern,
    DefaultCategorySuggestion,
};
pub use config::{EngineConfig, PredictionTier};
pub use db::Database;
pub use error::{Error, Result};
pub use intelligence::{
    BudgetSuggestion, ConfidenceScore, FrequencyPattern, IntelligenceService,
    NextTransactionPrediction, PayeeIntelligenceReport, SeasonalProfile, SpendingStatistics,
};
pub use sources::{
    CategorySource, CorrectionStore, FeedbackStore, LifecycleStore, PayeeSource, ProfileStore,
    TransactionSource,
};
pub use subscriptions::{
    CostAnalysis, LifecycleAnalysis, RenewalPrediction, SubscriptionClassification,
    SubscriptionEngine, UsageAnalysis,
};
