//! Mock backend for testing
//!
//! Useful for unit tests and development without a running LLM server.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{AiRefinement, PredictionContext};
use super::AIBackend;

/// Mock AI backend for testing
///
/// Echoes the local forecast back with a canned explanation unless a fixed
/// refinement is configured.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether calls succeed
    pub healthy: bool,
    /// Fixed refinement returned instead of the echo
    pub refinement: Option<AiRefinement>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            refinement: None,
        }
    }

    /// Create an unhealthy mock backend; every refinement fails
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            refinement: None,
        }
    }

    /// Always answer with `refinement`
    pub fn with_refinement(refinement: AiRefinement) -> Self {
        Self {
            healthy: true,
            refinement: Some(refinement),
        }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn refine_prediction(&self, context: &PredictionContext) -> Result<AiRefinement> {
        if !self.healthy {
            return Err(Error::Ai("mock backend is unavailable".into()));
        }
        if let Some(refinement) = &self.refinement {
            return Ok(refinement.clone());
        }

        Ok(AiRefinement {
            amount: None,
            days_until_next: None,
            confidence: None,
            explanation: format!(
                "{} usually charges about {:.2} based on the last {} payments.",
                context.payee_name,
                context.base_amount,
                context.recent_amounts.len()
            ),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
