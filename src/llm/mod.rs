//! Text generation backends.
//!
//! The chat service hands a fully assembled prompt to a [`TextGenerator`] and
//! gets the raw reply text back. Two HTTP backends are available:
//!
//! - [`GeminiGenerator`] — Google Gemini `generateContent`.
//! - [`OpenAiGenerator`] — any OpenAI-compatible chat completions server.
//!
//! Backends do not retry; every error is surfaced to the caller as-is.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Produces reply text for an assembled prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logs and health output (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Whether the backend has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// Generate reply text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the generator selected by `config`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn create_generator(
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiGenerator::new(config, api_key)?),
        LlmProvider::OpenAiCompatible => Arc::new(OpenAiGenerator::new(config, api_key)?),
    };
    Ok(generator)
}

/// Shared reqwest client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| BotError::Config(format!("HTTP client init failed: {e}")))
}

/// Extract a provider error message from a JSON error body.
///
/// Both Gemini and OpenAI-style servers use `{"error": {"message": ...}}`.
pub(crate) fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}
