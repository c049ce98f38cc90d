//! Google Translate speech endpoint.
//!
//! `GET {base}/translate_tts?ie=UTF-8&tl={lang}&client=tw-ob&q={text}` returns
//! an MP3 clip. The endpoint rejects long queries, so text is split into
//! chunks of at most [`MAX_CHUNK_CHARS`] characters on whitespace and the
//! clips are concatenated (MP3 frames concatenate cleanly).

use super::TextToSpeech;
use crate::config::TtsConfig;
use crate::error::{BotError, Result};
use crate::llm::http_client;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

/// Longest query the endpoint accepts reliably.
pub const MAX_CHUNK_CHARS: usize = 100;

#[derive(Debug)]
pub struct GoogleTranslateTts {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

impl GoogleTranslateTts {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let base_url = config.effective_api_url();
        info!("Google Translate TTS configured: {base_url} lang={}", config.language);
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url,
            language: config.language.clone(),
        })
    }

    async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> Result<Vec<u8>> {
        let total_s = total.to_string();
        let idx_s = idx.to_string();
        let response = self
            .client
            .get(format!("{}/translate_tts", self.base_url))
            .query(&[
                ("ie", "UTF-8"),
                ("tl", self.language.as_str()),
                ("client", "tw-ob"),
                ("total", total_s.as_str()),
                ("idx", idx_s.as_str()),
                ("q", chunk),
            ])
            .send()
            .await
            .map_err(|e| BotError::Tts(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Tts(format!(
                "speech endpoint HTTP {}",
                status.as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BotError::Tts(format!("speech download failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TextToSpeech for GoogleTranslateTts {
    fn is_configured(&self) -> bool {
        true
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(BotError::Tts("nothing to synthesize".to_owned()));
        }

        let started = Instant::now();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("tts chunk {}/{}: {chunk}", idx + 1, chunks.len());
            audio.extend(self.fetch_chunk(chunk, idx, chunks.len()).await?);
        }

        info!(
            "synthesized {} chunks ({} bytes) in {:.2}s",
            chunks.len(),
            audio.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(audio)
    }
}

/// Split `text` into whitespace-delimited chunks of at most `max_chars`
/// characters. Words longer than `max_chars` are cut at character boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
