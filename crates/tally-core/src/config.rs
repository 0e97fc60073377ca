//! Engine configuration
//!
//! Every tunable heuristic of the intelligence engine lives here.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Omitted keys keep their built-in values; unknown keys are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Concrete prediction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTier {
    /// Pure arithmetic over the history; always available
    Statistical,
    /// Deterministic local refinement (trend, outliers, interval robustness)
    Ml,
    /// `Ml` plus refinement and narrative from an external language model
    Ai,
}

impl PredictionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::Ml => "ml",
            Self::Ai => "ai",
        }
    }

    /// Next tier to try when this one is unavailable or fails
    pub fn fallback(&self) -> Option<PredictionTier> {
        match self {
            Self::Ai => Some(Self::Ml),
            Self::Ml => Some(Self::Statistical),
            Self::Statistical => None,
        }
    }
}

impl std::str::FromStr for PredictionTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "statistical" => Ok(Self::Statistical),
            "ml" => Ok(Self::Ml),
            "ai" => Ok(Self::Ai),
            _ => Err(format!("Unknown prediction tier: {}", s)),
        }
    }
}

impl std::fmt::Display for PredictionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    /// Tier used when a profile asks for the workspace default
    pub default_method: PredictionTier,
    /// Weight multiplier applied per step back in time
    pub recency_decay: f64,
    /// Number of recent transactions in the weighted average
    pub recent_window: usize,
}

#[derive(Debug, Clone)]
pub struct SpendingConfig {
    /// Minimum relative difference between halves to call a trend
    pub trend_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct FrequencyConfig {
    /// Relative tolerance around each canonical interval
    pub tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct ConfidenceConfig {
    pub saturation_transactions: usize,
    pub saturation_days: i64,
}

#[derive(Debug, Clone)]
pub struct SeasonalityConfig {
    /// Months of observed data before seasonal adjustments apply
    pub min_months: usize,
    /// Relative amplitude above which a profile counts as seasonal
    pub min_amplitude: f64,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Detections below this confidence are dropped
    pub min_confidence: f64,
    /// Minimum interval regularity for the frequency signal to count
    pub regularity_threshold: f64,
    /// Coefficient of variation at which amount consistency scores 0
    pub amount_cv_ceiling: f64,
    pub default_currency: String,
    /// Minimum days past the expected charge before inferring cancellation
    pub grace_days: i64,
    /// Price increase threshold (percentage)
    pub price_increase_percent: f64,
    /// Price increase threshold (absolute amount)
    pub price_increase_absolute: f64,
}

#[derive(Debug, Clone)]
pub struct CategoryConfig {
    /// Age at which a correction counts half as much as a fresh one
    pub recency_half_life_days: f64,
    pub qualification_min_corrections: usize,
    pub qualification_window_days: i64,
    pub suggestion_min_confidence: f64,
}

/// Full engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub prediction: PredictionConfig,
    pub spending: SpendingConfig,
    pub frequency: FrequencyConfig,
    pub confidence: ConfidenceConfig,
    pub seasonality: SeasonalityConfig,
    pub subscriptions: SubscriptionConfig,
    pub categories: CategoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prediction: PredictionConfig {
                default_method: PredictionTier::Ml,
                recency_decay: 0.8,
                recent_window: 12,
            },
            spending: SpendingConfig {
                trend_threshold: 0.1,
            },
            frequency: FrequencyConfig { tolerance: 0.25 },
            confidence: ConfidenceConfig {
                saturation_transactions: 20,
                saturation_days: 365,
            },
            seasonality: SeasonalityConfig {
                min_months: 3,
                min_amplitude: 0.2,
            },
            subscriptions: SubscriptionConfig {
                min_confidence: 0.3,
                regularity_threshold: 0.6,
                amount_cv_ceiling: 0.25,
                default_currency: "USD".to_string(),
                grace_days: 7,
                price_increase_percent: 5.0,
                price_increase_absolute: 1.0,
            },
            categories: CategoryConfig {
                recency_half_life_days: 90.0,
                qualification_min_corrections: 3,
                qualification_window_days: 90,
                suggestion_min_confidence: 0.6,
            },
        }
    }
}

impl EngineConfig {
    /// Load using the two-layer resolution (override file, then embedded defaults)
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit path, falling back to embedded defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("engine.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let content = match path {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "Loading engine config override");
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    prediction: Option<RawPrediction>,
    spending: Option<RawSpending>,
    frequency: Option<RawFrequency>,
    confidence: Option<RawConfidence>,
    seasonality: Option<RawSeasonality>,
    subscriptions: Option<RawSubscriptions>,
    categories: Option<RawCategories>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    default_method: Option<String>,
    recency_decay: Option<f64>,
    recent_window: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawSpending {
    trend_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFrequency {
    tolerance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawConfidence {
    saturation_transactions: Option<usize>,
    saturation_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawSeasonality {
    min_months: Option<usize>,
    min_amplitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptions {
    min_confidence: Option<f64>,
    regularity_threshold: Option<f64>,
    amount_cv_ceiling: Option<f64>,
    default_currency: Option<String>,
    grace_days: Option<i64>,
    price_increase_percent: Option<f64>,
    price_increase_absolute: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCategories {
    recency_half_life_days: Option<f64>,
    qualification_min_corrections: Option<usize>,
    qualification_window_days: Option<i64>,
    suggestion_min_confidence: Option<f64>,
}

fn unit_interval(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = EngineConfig::default();

    if let Some(p) = raw.prediction {
        if let Some(method) = p.default_method {
            config.prediction.default_method = method.parse().map_err(Error::Config)?;
        }
        if let Some(decay) = p.recency_decay {
            config.prediction.recency_decay = unit_interval("prediction.recency_decay", decay)?;
        }
        if let Some(window) = p.recent_window {
            config.prediction.recent_window = window.max(1);
        }
    }

    if let Some(s) = raw.spending {
        if let Some(threshold) = s.trend_threshold {
            config.spending.trend_threshold =
                unit_interval("spending.trend_threshold", threshold)?;
        }
    }

    if let Some(f) = raw.frequency {
        if let Some(tolerance) = f.tolerance {
            config.frequency.tolerance = unit_interval("frequency.tolerance", tolerance)?;
        }
    }

    if let Some(c) = raw.confidence {
        if let Some(n) = c.saturation_transactions {
            config.confidence.saturation_transactions = n.max(1);
        }
        if let Some(days) = c.saturation_days {
            config.confidence.saturation_days = days.max(1);
        }
    }

    if let Some(s) = raw.seasonality {
        if let Some(months) = s.min_months {
            config.seasonality.min_months = months;
        }
        if let Some(amplitude) = s.min_amplitude {
            config.seasonality.min_amplitude = positive("seasonality.min_amplitude", amplitude)?;
        }
    }

    if let Some(s) = raw.subscriptions {
        if let Some(v) = s.min_confidence {
            config.subscriptions.min_confidence = unit_interval("subscriptions.min_confidence", v)?;
        }
        if let Some(v) = s.regularity_threshold {
            config.subscriptions.regularity_threshold =
                unit_interval("subscriptions.regularity_threshold", v)?;
        }
        if let Some(v) = s.amount_cv_ceiling {
            config.subscriptions.amount_cv_ceiling =
                positive("subscriptions.amount_cv_ceiling", v)?;
        }
        if let Some(currency) = s.default_currency {
            config.subscriptions.default_currency = currency;
        }
        if let Some(days) = s.grace_days {
            config.subscriptions.grace_days = days.max(0);
        }
        if let Some(v) = s.price_increase_percent {
            config.subscriptions.price_increase_percent =
                positive("subscriptions.price_increase_percent", v)?;
        }
        if let Some(v) = s.price_increase_absolute {
            config.subscriptions.price_increase_absolute =
                positive("subscriptions.price_increase_absolute", v)?;
        }
    }

    if let Some(c) = raw.categories {
        if let Some(days) = c.recency_half_life_days {
            config.categories.recency_half_life_days =
                positive("categories.recency_half_life_days", days)?;
        }
        if let Some(n) = c.qualification_min_corrections {
            config.categories.qualification_min_corrections = n.max(1);
        }
        if let Some(days) = c.qualification_window_days {
            config.categories.qualification_window_days = days.max(1);
        }
        if let Some(v) = c.suggestion_min_confidence {
            config.categories.suggestion_min_confidence =
                unit_interval("categories.suggestion_min_confidence", v)?;
        }
    }

    Ok(config)
}
