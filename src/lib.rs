//! festbot: festival food chatbot backend.
//!
//! This crate answers visitor questions about an event's food menu for an
//! animated avatar front end. Each turn runs one short, strictly sequential
//! pipeline:
//! Upload → STT → Prompt → LLM → Emotion → TTS → Reply
//!
//! # Architecture
//!
//! - **Emotion**: labels each reply by priority-ordered keyword cues
//! - **Conversation**: assembles prompts from persona + recent history and
//!   wraps replies into envelopes
//! - **LLM**: Gemini or any OpenAI-compatible chat completions server
//! - **STT**: OpenAI-compatible Whisper transcription of staged uploads
//! - **TTS**: Google Translate speech (Tamil by default) or OpenAI-compatible
//!   speech synthesis
//! - **Server**: axum routes shared over one immutable [`ChatService`]

pub mod audio;
pub mod config;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod llm;
pub mod menu;
pub mod persona;
pub mod server;
pub mod service;
pub mod stt;
pub mod tts;

pub use config::{BotConfig, Credentials};
pub use conversation::{ChatRequest, ChatResponse, ConversationTurn, Speaker, VoiceChatResponse};
pub use emotion::{EmotionLabel, EmotionTable, classify};
pub use error::{BotError, Result};
pub use server::ChatServer;
pub use service::ChatService;
