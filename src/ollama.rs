//! Ollama-compatible HTTP client.
//!
//! Two calls: `GET /api/tags` for health/model discovery and
//! `POST /api/generate` for non-streaming inference. Failures are classified
//! into the crate taxonomy; the generate deadline is 120 s because local
//! models can take a long time on complex prompts.

use crate::error::{Result, WeaverError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Deadline for one generate call.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed response-length cap passed to the server.
pub const NUM_PREDICT: u32 = 2048;

/// One inference request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model name.
    pub model: String,
    /// The user's raw text.
    pub prompt: String,
    /// Composed system instruction (role + context block).
    pub system: String,
    /// Always false; the core consumes complete responses only.
    pub stream: bool,
    /// Sampling options.
    pub options: GenerateOptions,
}

/// Sampling options for a generate call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub num_predict: u32,
}

/// Payload returned by `/api/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// The generated text.
    #[serde(default)]
    pub response: String,
    /// Whether generation ran to completion.
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// HTTP client for an Ollama-compatible inference server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client with its own connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// List model names advertised by `{endpoint}/api/tags`.
    pub async fn list_models(&self, endpoint: &str, timeout: Duration) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| WeaverError::from_reqwest(&e))?;

        if !resp.status().is_success() {
            return Err(WeaverError::Server(format!(
                "Server responded with status {}",
                resp.status().as_u16()
            )));
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| WeaverError::Server(format!("invalid tags payload: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Issue one non-streaming generate call against `{endpoint}/api/generate`.
    ///
    /// A non-success status surfaces the server's error text verbatim.
    pub async fn generate(
        &self,
        endpoint: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let url = format!("{}/api/generate", endpoint.trim_end_matches('/'));
        debug!(model = %request.model, "issuing generate request");

        let resp = self
            .client
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| WeaverError::from_reqwest(&e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(WeaverError::Server(format!(
                "Ollama API error ({status}): {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| WeaverError::Server(format!("invalid generate payload: {e}")))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}
