//! OpenAI-compatible chat completions backend.
//!
//! Works with Groq, OpenAI, Ollama, vLLM, llama.cpp server and anything else
//! implementing `POST /v1/chat/completions`. The assembled prompt is sent as
//! one user message; the reply is `choices[0].message.content`.

use super::{TextGenerator, extract_error_message, http_client};
use crate::config::{LlmConfig, LlmProvider};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [RequestMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiGenerator {
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
        info!(
            "OpenAI-compatible LLM configured: {} model={}",
            generator.base_url, generator.model
        );
        Ok(generator)
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.strip_suffix("/v1").unwrap_or(&self.base_url);
        format!("{base}/v1/chat/completions")
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        LlmProvider::OpenAiCompatible.name()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Llm("LLM API key is not configured".to_owned()))?;

        let body = CompletionRequest {
            model: &self.model,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let started = Instant::now();

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Llm(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Llm(format!(
                "chat completion HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BotError::Llm(format!("chat completion parse failed: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BotError::Llm("chat completion returned no content".to_owned()))?;

        info!(
            "{} generated {} chars in {:.2}s",
            self.model,
            text.chars().count(),
            started.elapsed().as_secs_f64()
        );
        Ok(text)
    }
}
