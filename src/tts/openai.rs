//! OpenAI-compatible `/v1/audio/speech` backend.

use super::TextToSpeech;
use crate::config::TtsConfig;
use crate::error::{BotError, Result};
use crate::llm::{extract_error_message, http_client};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

pub struct OpenAiTts {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTts")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiTts {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig, api_key: Option<String>) -> Result<Self> {
        let url = config.effective_api_url();
        let base_url = url.strip_suffix("/v1").unwrap_or(&url).to_owned();
        info!(
            "OpenAI-compatible TTS configured: {base_url} model={} voice={}",
            config.model, config.voice
        );
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url,
            model: config.model.clone(),
            voice: config.voice.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Tts("TTS API key is not configured".to_owned()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(BotError::Tts("nothing to synthesize".to_owned()));
        }

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: text,
                response_format: "mp3",
            })
            .send()
            .await
            .map_err(|e| BotError::Tts(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Tts(format!(
                "speech HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| BotError::Tts(format!("speech download failed: {e}")))?
            .to_vec();
        info!(
            "synthesized {} bytes in {:.2}s",
            audio.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(audio)
    }
}
