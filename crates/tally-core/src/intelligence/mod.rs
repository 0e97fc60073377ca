//! Payee intelligence
//!
//! Statistical analyzers that mine one payee's transaction history:
//!
//! - **Spending** - descriptive statistics and trend
//! - **Frequency** - recurrence interval and regularity
//! - **Seasonality** - sparse monthly profile
//! - **Prediction** - next transaction and monthly budget
//! - **Confidence** - explainable confidence in those predictions
//!
//! Every analyzer is a plain struct built from [`crate::config::EngineConfig`]
//! and pure over an in-memory transaction slice. [`IntelligenceService`] wires
//! them to the storage and AI collaborators.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::intelligence::IntelligenceService;
//!
//! let service = IntelligenceService::new(&db, &config).with_ai(ai.as_ref());
//! let report = service.analyze(payee_id, today).await?;
//! ```

pub mod confidence;
pub mod engine;
pub mod frequency;
pub mod prediction;
pub mod seasonality;
pub mod spending;

pub use confidence::{ConfidenceFactor, ConfidenceScore, ConfidenceScorer, SubScore};
pub use engine::{Analyzers, IntelligenceService, PayeeIntelligenceReport, ReportDelta};
pub use frequency::{
    FrequencyPattern, FrequencyPatternDetector, IrregularPatterns, TransactionCluster, UnusualGap,
};
pub use prediction::{
    BudgetSuggestion, BudgetSuggestionEngine, NextTransactionPrediction, NextTransactionPredictor,
    PredictionInput, PredictionMethod, SeasonalAdjustment,
};
pub use seasonality::{SeasonalProfile, SeasonalTrend, SeasonalityDetector};
pub use spending::{SpendingPatternAnalyzer, SpendingStatistics};
