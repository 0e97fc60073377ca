//! Pluggable local AI backend abstraction
//!
//! The `ai` prediction tier asks a language model to refine a locally computed
//! forecast and narrate it. Nothing depends on the model for correctness: any
//! failure falls back to the local tiers.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)

mod mock;
mod ollama;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Refine a local next-transaction forecast and explain it
    async fn refine_prediction(&self, context: &PredictionContext) -> Result<AiRefinement>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn refine_prediction(&self, context: &PredictionContext) -> Result<AiRefinement> {
        match self {
            AIClient::Ollama(b) => b.refine_prediction(context).await,
            AIClient::Mock(b) => b.refine_prediction(context).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrendDirection;

    fn context() -> PredictionContext {
        PredictionContext {
            payee_name: "Netflix".into(),
            frequency: Some(crate::models::Frequency::Monthly),
            average_days_between: 30.4,
            recent_amounts: vec![15.99, 15.99, 15.99],
            base_amount: 15.99,
            base_date: None,
            trend: TrendDirection::Stable,
            trend_strength: 0.0,
            volatility: 0.0,
        }
    }

    #[tokio::test]
    async fn test_mock_echoes_with_explanation() {
        let client = AIClient::mock();
        assert!(client.health_check().await);
        let refinement = client.refine_prediction(&context()).await.unwrap();
        assert_eq!(refinement.amount, None);
        assert!(refinement.explanation.contains("Netflix"));
    }

    #[tokio::test]
    async fn test_unhealthy_mock_fails() {
        let client = AIClient::Mock(MockBackend::unhealthy());
        assert!(!client.health_check().await);
        assert!(client.refine_prediction(&context()).await.is_err());
    }

    #[test]
    fn test_prompt_mentions_forecast() {
        let prompt = context().prompt();
        assert!(prompt.contains("Netflix"));
        assert!(prompt.contains("monthly"));
        assert!(prompt.contains("15.99"));
    }
}
