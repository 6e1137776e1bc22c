/// Generation service boundary
///
/// Wraps the external text-generation service behind a trait. A call is a
/// single attempt under a hard timeout; transport-level failures are distinct
/// kinds surfaced to the narrative synthesizer and never propagated further.
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

/// Failure kinds for a generation call
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,

    #[error("generation service unreachable: {0}")]
    Connection(String),

    #[error("generation service returned status {0}")]
    Status(u16),

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation returned empty text")]
    Empty,
}

/// Fixed options for a generation call
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Word count the output is truncated toward
    pub target_words: usize,
    /// Word count above which truncation kicks in
    pub soft_cap_words: usize,
    /// Sampling temperature
    pub temperature: f64,
    /// Hard request timeout
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            target_words: 40,
            soft_cap_words: 45,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate text for a prompt. One attempt, no retries at this layer.
    async fn generate(&self, prompt: &str, options: &GenerationOptions)
        -> Result<String, GenerationError>;
}

/// Ollama client for local LLM generation
#[derive(Clone)]
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl GenerationService for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                // Roughly two tokens per word of headroom
                "num_predict": (options.target_words * 2) as u64,
            },
        });

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(options.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Generation service error status");
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = body
            .response
            .ok_or_else(|| GenerationError::Malformed("missing response field".to_string()))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}
