//! Conversation turns, prompt assembly and response envelopes.
//!
//! A chat request is turned into a single prompt string:
//!
//! ```text
//! {persona}
//!
//! CONVERSATION:
//! user: ...
//! assistant: ...
//! user: {new message}
//! assistant:
//! ```
//!
//! The generated reply is then trimmed, optionally cut to a maximum length
//! and labelled with an [`EmotionLabel`] by the keyword classifier.

use crate::emotion::{EmotionLabel, EmotionTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Marker line placed between the persona block and the transcript.
pub const CONVERSATION_MARKER: &str = "CONVERSATION:";

/// Open assistant turn the generator is asked to complete.
pub const ASSISTANT_CUE: &str = "assistant:";

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    #[default]
    User,
    Assistant,
    System,
}

impl Speaker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Front ends send whatever role string their chat widget uses. Anything that
// is not recognisably the bot or a system note counts as the user.
impl From<String> for Speaker {
    fn from(role: String) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "assistant" | "bot" | "model" => Self::Assistant,
            "system" => Self::System,
            _ => Self::User,
        }
    }
}

impl From<Speaker> for String {
    fn from(speaker: Speaker) -> Self {
        speaker.as_str().to_owned()
    }
}

/// One recorded message of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub role: Speaker,
    #[serde(default)]
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Speaker, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Speaker::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, content)
    }

    /// Decode one history entry, defaulting a role or content that is
    /// missing or not a string. Entries that are not objects are skipped.
    fn from_value_lenient(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let role = fields
            .get("role")
            .and_then(Value::as_str)
            .map(|r| Speaker::from(r.to_owned()))
            .unwrap_or_default();
        let content = fields
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(role, content))
    }
}

/// Chronological list of turns, oldest first.
pub type ConversationHistory = Vec<ConversationTurn>;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "conversation_history")]
    pub history: ConversationHistory,
    /// Ask for a synthesized voice reply alongside the text.
    #[serde(default)]
    pub voice: bool,
}

impl ChatRequest {
    /// Decode a `/chat` body field by field.
    ///
    /// A malformed field falls back to its default without touching the
    /// others, so a good `message` survives a broken history. A body that is
    /// not a JSON object decodes as the empty request.
    pub fn from_json_lenient(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Self::from_fields(&fields),
            _ => Self::default(),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let message = fields
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let history = fields
            .get("conversation_history")
            .or_else(|| fields.get("history"))
            .and_then(Value::as_array)
            .map(|turns| {
                turns
                    .iter()
                    .filter_map(ConversationTurn::from_value_lenient)
                    .collect()
            })
            .unwrap_or_default();
        let voice = fields
            .get("voice")
            .and_then(Value::as_bool)
            .unwrap_or_default();
        Self {
            message,
            history,
            voice,
        }
    }

    /// True when there is nothing to send to the generator.
    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
    }
}

/// Reply envelope returned to the avatar front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(rename = "response")]
    pub text: String,
    pub emotion: EmotionLabel,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "audio_base64"
    )]
    pub audio: Option<Vec<u8>>,
}

impl ChatResponse {
    pub fn new(text: impl Into<String>, emotion: EmotionLabel) -> Self {
        Self {
            text: text.into(),
            emotion,
            audio: None,
        }
    }

    /// Canned reply for an empty message. No external call is involved.
    pub fn greeting(text: impl Into<String>) -> Self {
        Self::new(text, EmotionLabel::Happy)
    }

    /// Uniform degraded reply for any upstream failure.
    pub fn failure(text: impl Into<String>) -> Self {
        Self::new(text, EmotionLabel::Sad)
    }

    pub fn with_audio(mut self, audio: Vec<u8>) -> Self {
        self.audio = Some(audio);
        self
    }
}

/// Reply to `POST /voice-chat`: the transcript, the reply and its speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChatResponse {
    pub user_text: String,
    pub bot_text: String,
    pub emotion: EmotionLabel,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "audio_base64"
    )]
    pub audio: Option<Vec<u8>>,
}

impl VoiceChatResponse {
    pub fn new(user_text: impl Into<String>, reply: ChatResponse) -> Self {
        Self {
            user_text: user_text.into(),
            bot_text: reply.text,
            emotion: reply.emotion,
            audio: reply.audio,
        }
    }
}

/// Base64 (standard alphabet) encoding for optional audio payloads.
pub(crate) mod audio_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match audio {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Assemble the generator prompt.
///
/// Keeps the last `window` turns of `history` (all of them when `window` is
/// `None` or larger than the history) in their original order.
pub fn build_prompt(
    persona: &str,
    history: &[ConversationTurn],
    window: Option<usize>,
    new_message: &str,
) -> String {
    let start = window.map_or(0, |w| history.len().saturating_sub(w));
    let recent = &history[start..];

    let mut prompt = String::with_capacity(
        persona.len()
            + recent.iter().map(|t| t.content.len() + 12).sum::<usize>()
            + new_message.len()
            + 48,
    );
    prompt.push_str(persona);
    prompt.push_str("\n\n");
    prompt.push_str(CONVERSATION_MARKER);
    prompt.push('\n');
    for turn in recent {
        prompt.push_str(turn.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str("user: ");
    prompt.push_str(new_message);
    prompt.push('\n');
    prompt.push_str(ASSISTANT_CUE);
    prompt
}

/// Wrap raw generated text into a [`ChatResponse`].
///
/// Trims surrounding whitespace, hard-cuts to `max_chars` characters when
/// given (mid-word if need be), then classifies the result.
pub fn build_response(
    raw: &str,
    max_chars: Option<usize>,
    emotions: &EmotionTable,
) -> ChatResponse {
    let trimmed = raw.trim();
    let text = match max_chars {
        Some(max) => truncate_chars(trimmed, max),
        None => trimmed,
    };
    ChatResponse::new(text, emotions.classify(text))
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
