//! Test utilities for tally-core
//!
//! This module provides testing infrastructure including a mock Ollama server
//! that answers prediction refinement prompts, for development and integration tests.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
///
/// Answers based on the payee named in the refinement prompt:
/// - names containing NETFLIX get a price bump to 16.49 in 30 days
/// - names containing GARBLE get prose with no JSON in it
/// - anything else keeps the forecast and only adds an explanation
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let payee = extract_payee_from_prompt(&request.prompt);
    let p = payee.to_uppercase();

    let response = if p.contains("NETFLIX") {
        format!(
            r#"Here is my assessment:
{{"amount": 16.49, "days_until_next": 30, "confidence": 0.8, "explanation": "{} announced a price increase."}}"#,
            payee
        )
    } else if p.contains("GARBLE") {
        "I am not sure what to make of this payee.".to_string()
    } else {
        format!(
            r#"{{"amount": null, "days_until_next": null, "confidence": null, "explanation": "{} looks steady."}}"#,
            payee
        )
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Extract the payee name from a refinement prompt
fn extract_payee_from_prompt(prompt: &str) -> String {
    // Format: ...for the payee "{{name}}".
    const MARKER: &str = "for the payee \"";
    if let Some(start) = prompt.find(MARKER) {
        let after_start = &prompt[start + MARKER.len()..];
        if let Some(end) = after_start.find('"') {
            return after_start[..end].to_string();
        }
    }
    "Unknown".to_string()
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}
