//! Google Gemini backend.
//!
//! Sends the prompt as a single user part to
//! `POST {base}/v1beta/models/{model}:generateContent` and returns the text of
//! the first candidate, all of its parts joined.

use super::{TextGenerator, extract_error_message, http_client};
use crate::config::{LlmConfig, LlmProvider};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl GeminiGenerator {
    /// Create a client from config and the resolved API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let generator = Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.effective_api_url(),
            model: config.effective_model(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        info!("Gemini LLM configured: {} model={}", generator.base_url, generator.model);
        Ok(generator)
    }

    fn request_body(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        LlmProvider::Gemini.name()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Llm("Gemini API key is not configured".to_owned()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| BotError::Llm(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Llm(format!(
                "Gemini HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BotError::Llm(format!("Gemini response parse failed: {e}")))?;

        let parts = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .ok_or_else(|| BotError::Llm("Gemini returned no candidates".to_owned()))?;
        let text: String = parts.into_iter().map(|p| p.text).collect();

        debug!("Gemini raw reply: {text}");
        info!(
            "Gemini generated {} chars in {:.2}s",
            text.chars().count(),
            started.elapsed().as_secs_f64()
        );
        Ok(text)
    }
}
