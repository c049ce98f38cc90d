//! Configuration types for the chat backend.
//!
//! Everything that varies per event (persona, menu, cue-word table,
//! providers) is a config input. The config is built once at startup and
//! shared read-only.

use crate::emotion::{EmotionLabel, EmotionPreset, EmotionRule, EmotionTable};
use crate::menu::{MenuItem, pongal_2026_menu};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Text generation provider settings.
    pub llm: LlmConfig,
    /// Speech-to-text provider settings.
    pub stt: SttConfig,
    /// Text-to-speech provider settings.
    pub tts: TtsConfig,
    /// Persona text and event naming.
    pub persona: PersonaConfig,
    /// Emotion cue table.
    pub emotion: EmotionConfig,
    /// Menu served by `/menu`.
    pub menu: MenuConfig,
    /// Degraded reply sent when a collaborator fails.
    pub failure: FailureConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Maximum accepted request body, in bytes (applies to audio uploads).
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Which text generation API to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Any OpenAI-compatible `/v1/chat/completions` server (Groq, OpenAI, Ollama, ...).
    #[serde(alias = "openai", alias = "groq")]
    OpenAiCompatible,
}

impl LlmProvider {
    /// Short name used in logs and in the health payload.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai",
        }
    }
}

/// Text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which API to call.
    pub provider: LlmProvider,
    /// Base URL override. `None` uses the provider's public endpoint.
    pub api_url: Option<String>,
    /// Model name override. `None` uses the provider default.
    pub model: Option<String>,
    /// Environment variable holding the API key. `None` uses the provider default.
    pub api_key_env: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate per reply.
    pub max_tokens: u32,
    /// Number of most recent history turns included in the prompt.
    ///
    /// Set to 0 to include the whole history.
    pub history_window: usize,
    /// Hard cap on reply length in characters. Set to 0 to disable.
    pub max_response_chars: usize,
    /// Upper bound on a single generation call.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_url: None,
            model: None,
            api_key_env: None,
            temperature: 0.7,
            max_tokens: 300,
            history_window: 6,
            max_response_chars: 0,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// Base URL to call, without a trailing slash.
    pub fn effective_api_url(&self) -> String {
        let url = self.api_url.as_deref().unwrap_or(match self.provider {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
            LlmProvider::OpenAiCompatible => "https://api.groq.com/openai",
        });
        url.trim_end_matches('/').to_owned()
    }

    /// Model name to request.
    pub fn effective_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| match self.provider {
                LlmProvider::Gemini => "gemini-2.0-flash".to_owned(),
                LlmProvider::OpenAiCompatible => "llama-3.1-8b-instant".to_owned(),
            })
    }

    /// Name of the environment variable holding the API key.
    pub fn effective_api_key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| match self.provider {
                LlmProvider::Gemini => "GEMINI_API_KEY".to_owned(),
                LlmProvider::OpenAiCompatible => "GROQ_API_KEY".to_owned(),
            })
    }

    /// History window for prompt assembly (`None` = everything).
    pub fn window(&self) -> Option<usize> {
        (self.history_window > 0).then_some(self.history_window)
    }

    /// Reply length cap (`None` = unlimited).
    pub fn max_chars(&self) -> Option<usize> {
        (self.max_response_chars > 0).then_some(self.max_response_chars)
    }
}

/// Speech-to-text configuration (OpenAI-compatible transcription endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Whether `/voice-chat` is served.
    pub enabled: bool,
    /// Base URL of the transcription server.
    pub api_url: String,
    /// Transcription model.
    pub model: String,
    /// Spoken language hint (ISO-639-1). Empty lets the service detect it.
    pub language: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Uploads smaller than this are rejected without a transcription call.
    pub min_audio_bytes: usize,
    /// Upper bound on a single transcription call.
    pub timeout_secs: u64,
    /// Where uploads are staged. Unset uses the system temp directory.
    pub staging_dir: Option<PathBuf>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.groq.com/openai".to_owned(),
            model: "whisper-large-v3-turbo".to_owned(),
            language: "en".to_owned(),
            api_key_env: "GROQ_API_KEY".to_owned(),
            min_audio_bytes: 1000,
            timeout_secs: 30,
            staging_dir: None,
        }
    }
}

/// Which text-to-speech service to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsBackend {
    /// Google Translate speech endpoint (keyless, language-code driven).
    #[default]
    GoogleTranslate,
    /// OpenAI-compatible `/v1/audio/speech`.
    #[serde(alias = "openai")]
    OpenAiCompatible,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Whether voice replies and `/tts` are served.
    pub enabled: bool,
    /// Which service to call.
    pub backend: TtsBackend,
    /// Language code of the synthesized speech.
    pub language: String,
    /// Base URL override. `None` uses the backend's public endpoint.
    pub api_url: Option<String>,
    /// Model (OpenAI-compatible backend only).
    pub model: String,
    /// Voice name (OpenAI-compatible backend only).
    pub voice: String,
    /// Environment variable holding the API key (OpenAI-compatible backend only).
    pub api_key_env: String,
    /// Upper bound on a single synthesis call.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: TtsBackend::default(),
            language: "ta".to_owned(),
            api_url: None,
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl TtsConfig {
    /// Base URL to call, without a trailing slash.
    pub fn effective_api_url(&self) -> String {
        let url = self.api_url.as_deref().unwrap_or(match self.backend {
            TtsBackend::GoogleTranslate => "https://translate.google.com",
            TtsBackend::OpenAiCompatible => "https://api.openai.com",
        });
        url.trim_end_matches('/').to_owned()
    }

    /// Whether the backend needs an API key at all.
    pub fn needs_api_key(&self) -> bool {
        self.backend == TtsBackend::OpenAiCompatible
    }
}

/// Persona and event naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Name used in the `/` status line.
    pub bot_name: String,
    /// Event name reported by `/`, `/health` and `/menu`.
    pub event: String,
    /// Inline persona text. Takes precedence over `prompt_file`.
    pub prompt: Option<String>,
    /// File holding the persona text.
    pub prompt_file: Option<PathBuf>,
    /// Canned reply to an empty message.
    pub greeting: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            bot_name: "Pongal Celebration Chatbot".to_owned(),
            event: "Pongal Celebrations 2026".to_owned(),
            prompt: None,
            prompt_file: None,
            greeting: "Vanakkam! Welcome to the Pongal Celebrations 2026 food desk. \
                       Ask me about any dish on the menu."
                .to_owned(),
        }
    }
}

/// Emotion cue table configuration.
///
/// `rules` replaces the preset's rules when non-empty; `default` replaces the
/// preset's fallback label when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub preset: EmotionPreset,
    pub rules: Vec<EmotionRule>,
    pub default: Option<EmotionLabel>,
}

impl EmotionConfig {
    /// Build the classifier table described by this config.
    pub fn table(&self) -> EmotionTable {
        let rules = if self.rules.is_empty() {
            self.preset.rules()
        } else {
            self.rules.clone()
        };
        let default = self.default.unwrap_or_else(|| self.preset.default_label());
        EmotionTable::new(rules, default)
    }
}

/// Menu configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    pub items: Vec<MenuItem>,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            items: pongal_2026_menu(),
        }
    }
}

/// Degraded reply configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    /// Text sent (with emotion `sad`) when a collaborator fails.
    pub apology: String,
    /// Append a shortened error message to the apology.
    pub include_error_detail: bool,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            apology: "Sorry, I'm having trouble answering right now. Please try again in a moment."
                .to_owned(),
            include_error_detail: false,
        }
    }
}

/// API keys read from the process environment at startup.
///
/// A missing key is not fatal: `/health` reports it and the affected call
/// fails with the usual degraded reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub llm_api_key: Option<String>,
    pub stt_api_key: Option<String>,
    pub tts_api_key: Option<String>,
}

impl Credentials {
    /// Read every key named by `config` from the environment.
    pub fn from_env(config: &BotConfig) -> Self {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolve keys through an arbitrary lookup (tests, secret stores).
    pub fn from_lookup(config: &BotConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        Self {
            llm_api_key: read(&config.llm.effective_api_key_env()),
            stt_api_key: read(&config.stt.api_key_env),
            tts_api_key: if config.tts.needs_api_key() {
                read(&config.tts.api_key_env)
            } else {
                None
            },
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BotError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/festbot/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("festbot").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("festbot")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/festbot-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BotConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.window(), Some(6));
        assert_eq!(config.llm.max_chars(), None);
        assert!(config.llm.timeout_secs > 0);
        assert_eq!(config.tts.language, "ta");
        assert_eq!(config.menu.items.len(), 16);
        assert_eq!(config.emotion.table().default_label(), EmotionLabel::Neutral);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BotConfig::default();
        config.server.port = 9090;
        config.llm.provider = LlmProvider::OpenAiCompatible;
        config.llm.history_window = 10;
        config.persona.event = "Onam 2026".to_owned();

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = BotConfig::from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 9090);
        assert_eq!(loaded.llm.provider, LlmProvider::OpenAiCompatible);
        assert_eq!(loaded.llm.window(), Some(10));
        assert_eq!(loaded.persona.event, "Onam 2026");
        assert_eq!(loaded.menu.items, config.menu.items);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = BotConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            BotConfig::from_file(&path),
            Err(crate::error::BotError::Config(_))
        ));
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = BotConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("festbot"));
    }

    #[test]
    fn provider_defaults_follow_provider() {
        let mut llm = LlmConfig::default();
        assert_eq!(
            llm.effective_api_url(),
            "https://generativelanguage.googleapis.com"
        );
        assert_eq!(llm.effective_api_key_env(), "GEMINI_API_KEY");

        llm.provider = LlmProvider::OpenAiCompatible;
        assert_eq!(llm.effective_api_url(), "https://api.groq.com/openai");
        assert_eq!(llm.effective_model(), "llama-3.1-8b-instant");
        assert_eq!(llm.effective_api_key_env(), "GROQ_API_KEY");

        llm.api_url = Some("http://localhost:11434/".to_owned());
        llm.model = Some("llama3.2".to_owned());
        assert_eq!(llm.effective_api_url(), "http://localhost:11434");
        assert_eq!(llm.effective_model(), "llama3.2");
    }

    #[test]
    fn provider_aliases_deserialize() {
        let config: BotConfig = toml::from_str("[llm]\nprovider = \"groq\"").unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAiCompatible);
        let config: BotConfig = toml::from_str("[tts]\nbackend = \"openai\"").unwrap();
        assert_eq!(config.tts.backend, TtsBackend::OpenAiCompatible);
    }

    #[test]
    fn zero_window_means_whole_history() {
        let config: BotConfig =
            toml::from_str("[llm]\nhistory_window = 0\nmax_response_chars = 200").unwrap();
        assert_eq!(config.llm.window(), None);
        assert_eq!(config.llm.max_chars(), Some(200));
    }

    #[test]
    fn emotion_section_selects_simple_preset() {
        let config: BotConfig = toml::from_str("[emotion]\npreset = \"simple\"").unwrap();
        let table = config.emotion.table();
        assert_eq!(table.default_label(), EmotionLabel::Happy);
        assert_eq!(table.classify("nothing matches here"), EmotionLabel::Happy);
    }

    #[test]
    fn emotion_section_custom_rules_and_default() {
        let toml_str = r#"
[emotion]
default = "concerned"

[[emotion.rules]]
label = "excited"
cues = ["diwali"]

[[emotion.rules]]
label = "sad"
cues = ["sold out"]
"#;
        let config: BotConfig = toml::from_str(toml_str).unwrap();
        let table = config.emotion.table();
        assert_eq!(table.rules().len(), 2);
        assert_eq!(table.classify("Happy Diwali"), EmotionLabel::Excited);
        assert_eq!(table.classify("Jalebi is sold out"), EmotionLabel::Sad);
        assert_eq!(table.classify("Pongal"), EmotionLabel::Concerned);
    }

    #[test]
    fn menu_section_replaces_builtin_menu() {
        let toml_str = r#"
[[menu.items]]
id = 1
name = "Payasam"
type = "Dessert"
incharge = "Kitchen"
servings = 50
"#;
        let config: BotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.menu.items.len(), 1);
        assert_eq!(config.menu.items[0].serving_count, Some(50));
    }

    #[test]
    fn credentials_skip_blank_values() {
        let config = BotConfig::default();
        let creds = Credentials::from_lookup(&config, |name| match name {
            "GEMINI_API_KEY" => Some(" gm-key ".to_owned()),
            "GROQ_API_KEY" => Some("   ".to_owned()),
            _ => None,
        });
        assert_eq!(creds.llm_api_key.as_deref(), Some("gm-key"));
        assert!(creds.stt_api_key.is_none());
        // Google Translate speech needs no key.
        assert!(creds.tts_api_key.is_none());
    }

    #[test]
    fn credentials_read_tts_key_for_openai_backend() {
        let mut config = BotConfig::default();
        config.tts.backend = TtsBackend::OpenAiCompatible;
        let creds = Credentials::from_lookup(&config, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-test".to_owned())
        });
        assert_eq!(creds.tts_api_key.as_deref(), Some("sk-test"));
    }
}
