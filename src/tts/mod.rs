//! Text-to-speech synthesis.
//!
//! Both backends return MP3 bytes:
//!
//! - [`GoogleTranslateTts`] — the keyless Google Translate speech endpoint,
//!   driven only by a language code (Tamil by default).
//! - [`OpenAiTts`] — any OpenAI-compatible `/v1/audio/speech` server.

mod google;
mod openai;

pub use google::{GoogleTranslateTts, split_into_chunks};
pub use openai::OpenAiTts;

use crate::config::{TtsBackend, TtsConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// MIME type of everything the synthesizers produce.
pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Turns reply text into encoded speech.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Whether the backend has the credentials it needs.
    fn is_configured(&self) -> bool;

    /// Content type of the bytes returned by [`synthesize`](Self::synthesize).
    fn content_type(&self) -> &'static str {
        AUDIO_MPEG
    }

    /// Synthesize `text` into encoded audio.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Build the synthesizer selected by `config`, or `None` when disabled.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn create_tts(
    config: &TtsConfig,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn TextToSpeech>>> {
    if !config.enabled {
        return Ok(None);
    }
    let tts: Arc<dyn TextToSpeech> = match config.backend {
        TtsBackend::GoogleTranslate => Arc::new(GoogleTranslateTts::new(config)?),
        TtsBackend::OpenAiCompatible => Arc::new(OpenAiTts::new(config, api_key)?),
    };
    Ok(Some(tts))
}
