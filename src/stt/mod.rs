//! Speech-to-text via an OpenAI-compatible transcription endpoint.
//!
//! Groq, OpenAI and local Whisper servers all accept
//! `POST {base}/v1/audio/transcriptions` with a multipart body carrying the
//! audio `file`, the `model`, an optional `language` and
//! `response_format=json`. The reply is `{"text": "..."}`.

use crate::config::SttConfig;
use crate::error::{BotError, Result};
use crate::llm::{extract_error_message, http_client};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// One uploaded recording, ready to send.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: &'static str,
}

/// Turns recorded speech into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Whether the backend has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// Transcribe one recording.
    async fn transcribe(&self, audio: AudioPayload) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Whisper-style transcription client.
pub struct WhisperApiStt {
    client: reqwest::Client,
    base_url: String,
    model: String,
    language: String,
    api_key: Option<String>,
    min_audio_bytes: usize,
}

impl std::fmt::Debug for WhisperApiStt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperApiStt")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl WhisperApiStt {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SttConfig, api_key: Option<String>) -> Result<Self> {
        let base = config.api_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base).to_owned();
        info!("STT configured: {base} model={}", config.model);
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base,
            model: config.model.clone(),
            language: config.language.trim().to_owned(),
            api_key,
            min_audio_bytes: config.min_audio_bytes,
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperApiStt {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, audio: AudioPayload) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Stt("STT API key is not configured".to_owned()))?;

        if audio.bytes.len() < self.min_audio_bytes {
            return Err(BotError::Stt(format!(
                "recording too short ({} bytes)",
                audio.bytes.len()
            )));
        }

        let size = audio.bytes.len();
        let part = reqwest::multipart::Part::bytes(audio.bytes)
            .file_name(audio.file_name)
            .mime_str(audio.mime)
            .map_err(|e| BotError::Stt(format!("invalid audio mime type: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BotError::Stt(format!("transcription request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Stt(format!(
                "transcription HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| BotError::Stt(format!("transcription parse failed: {e}")))?;
        let text = body.text.trim().to_owned();

        info!(
            "transcribed {size} bytes into {} chars in {:.2}s",
            text.chars().count(),
            started.elapsed().as_secs_f64()
        );
        Ok(text)
    }
}

/// Build the transcription backend, or `None` when disabled.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn create_stt(
    config: &SttConfig,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn SpeechToText>>> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(WhisperApiStt::new(config, api_key)?)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config_for(server: &MockServer) -> SttConfig {
        SttConfig {
            api_url: format!("{}/v1", server.uri()),
            model: "whisper-test".to_owned(),
            min_audio_bytes: 4,
            ..SttConfig::default()
        }
    }

    fn payload(bytes: &[u8]) -> AudioPayload {
        AudioPayload {
            bytes: bytes.to_vec(),
            file_name: "audio.webm".to_owned(),
            mime: "audio/webm",
        }
    }

    fn body_contains(req: &Request, needle: &str) -> bool {
        String::from_utf8_lossy(&req.body).contains(needle)
    }

    #[tokio::test]
    async fn posts_multipart_and_trims_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer gsk-stt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"text": "  What is Ven Pongal? "})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stt = WhisperApiStt::new(&config_for(&server), Some("gsk-stt".into())).unwrap();
        let text = stt.transcribe(payload(b"webm-audio-bytes")).await.unwrap();
        assert_eq!(text, "What is Ven Pongal?");

        let requests = server.received_requests().await.unwrap();
        let req = &requests[0];
        assert!(body_contains(req, "name=\"file\"; filename=\"audio.webm\""));
        assert!(body_contains(req, "whisper-test"));
        assert!(body_contains(req, "name=\"language\""));
        assert!(body_contains(req, "name=\"response_format\""));
    }

    #[tokio::test]
    async fn empty_language_is_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hi"})))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.language = "  ".to_owned();
        let stt = WhisperApiStt::new(&config, Some("k".into())).unwrap();
        stt.transcribe(payload(b"0123456789")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!body_contains(&requests[0], "name=\"language\""));
    }

    #[tokio::test]
    async fn short_recording_is_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let stt = WhisperApiStt::new(&config_for(&server), Some("k".into())).unwrap();
        let err = stt.transcribe(payload(b"ab")).await.unwrap_err();
        assert!(matches!(err, BotError::Stt(_)));
    }

    #[tokio::test]
    async fn http_error_maps_to_stt_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "file must be one of the supported formats"}
            })))
            .mount(&server)
            .await;

        let stt = WhisperApiStt::new(&config_for(&server), Some("k".into())).unwrap();
        let err = stt.transcribe(payload(b"0123456789")).await.unwrap_err();
        assert!(err.to_string().contains("supported formats"));
    }

    #[test]
    fn disabled_stt_builds_nothing() {
        let config = SttConfig {
            enabled: false,
            ..SttConfig::default()
        };
        assert!(create_stt(&config, Some("k".into())).unwrap().is_none());
        assert!(create_stt(&SttConfig::default(), None).unwrap().is_some());
    }
}
