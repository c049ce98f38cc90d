//! Error types for the chat backend.

/// Top-level error type for the festival chatbot.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Text generation (LLM provider) error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Uploaded audio could not be staged or decoded.
    #[error("audio error: {0}")]
    Audio(String),

    /// An external call did not finish within its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP server error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Returns true when the error came from (or on the way to) one of the
    /// external collaborators: generation, transcription or synthesis.
    ///
    /// All of these are reported to clients the same way.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Llm(_) | Self::Stt(_) | Self::Tts(_) | Self::Audio(_) | Self::Timeout(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
