//! Request orchestration.
//!
//! [`ChatService`] owns everything a request needs (persona, emotion table,
//! collaborators) and is shared immutably between requests behind an `Arc`.
//! Each request makes at most one transcription, one generation and one
//! synthesis call, strictly in that order, each under its own timeout.

use crate::audio::StagedAudio;
use crate::config::{BotConfig, Credentials};
use crate::conversation::{
    ChatRequest, ChatResponse, VoiceChatResponse, build_prompt, build_response, truncate_chars,
};
use crate::emotion::EmotionTable;
use crate::error::{BotError, Result};
use crate::llm::{TextGenerator, create_generator};
use crate::menu::MenuResponse;
use crate::persona::load_persona;
use crate::stt::{AudioPayload, SpeechToText, create_stt};
use crate::tts::{TextToSpeech, create_tts};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How much of an error message is appended to the apology when
/// `failure.include_error_detail` is on.
pub const ERROR_DETAIL_CHARS: usize = 120;

pub struct ChatService {
    config: Arc<BotConfig>,
    persona: String,
    emotions: EmotionTable,
    generator: Arc<dyn TextGenerator>,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("event", &self.config.persona.event)
            .field("generator", &self.generator.name())
            .field("stt", &self.stt.is_some())
            .field("tts", &self.tts.is_some())
            .finish()
    }
}

impl ChatService {
    /// Build the service and its HTTP collaborators from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the persona cannot be loaded or an HTTP client
    /// cannot be constructed.
    pub fn new(config: BotConfig, credentials: Credentials) -> Result<Self> {
        let generator = create_generator(&config.llm, credentials.llm_api_key)?;
        let stt = create_stt(&config.stt, credentials.stt_api_key)?;
        let tts = create_tts(&config.tts, credentials.tts_api_key)?;
        Self::with_backends(Arc::new(config), generator, stt, tts)
    }

    /// Build the service around already constructed collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the persona cannot be loaded.
    pub fn with_backends(
        config: Arc<BotConfig>,
        generator: Arc<dyn TextGenerator>,
        stt: Option<Arc<dyn SpeechToText>>,
        tts: Option<Arc<dyn TextToSpeech>>,
    ) -> Result<Self> {
        let persona = load_persona(&config.persona)?;
        let emotions = config.emotion.table();

        if !generator.is_configured() {
            warn!(
                "{} API key missing ({}); chat replies will degrade",
                generator.name(),
                config.llm.effective_api_key_env()
            );
        }
        if stt.as_ref().is_some_and(|s| !s.is_configured()) {
            warn!("STT API key missing ({}); voice chat will degrade", config.stt.api_key_env);
        }
        if tts.as_ref().is_some_and(|t| !t.is_configured()) {
            warn!("TTS API key missing ({}); voice replies will degrade", config.tts.api_key_env);
        }

        Ok(Self {
            config,
            persona,
            emotions,
            generator,
            stt,
            tts,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn llm_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn stt_configured(&self) -> bool {
        self.stt.as_ref().is_some_and(|s| s.is_configured())
    }

    pub fn tts_configured(&self) -> bool {
        self.tts.as_ref().is_some_and(|t| t.is_configured())
    }

    pub fn tts_content_type(&self) -> &'static str {
        self.tts
            .as_ref()
            .map_or(crate::tts::AUDIO_MPEG, |t| t.content_type())
    }

    pub fn menu(&self) -> MenuResponse {
        MenuResponse::new(&self.config.persona.event, &self.config.menu.items)
    }

    /// Canned reply for an empty message.
    pub fn greeting(&self) -> ChatResponse {
        ChatResponse::greeting(&self.config.persona.greeting)
    }

    /// The uniform degraded reply for an upstream failure.
    pub fn failure_response(&self, err: &BotError) -> ChatResponse {
        let failure = &self.config.failure;
        if failure.include_error_detail {
            let detail = err.to_string();
            ChatResponse::failure(format!(
                "{} ({})",
                failure.apology,
                truncate_chars(&detail, ERROR_DETAIL_CHARS)
            ))
        } else {
            ChatResponse::failure(&failure.apology)
        }
    }

    /// Answer one text turn.
    ///
    /// An empty message short-circuits to the greeting without any external
    /// call. When `request.voice` is set and synthesis is enabled, the reply
    /// carries speech.
    ///
    /// # Errors
    ///
    /// Returns the first upstream error (generation or synthesis).
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if request.is_empty() {
            debug!("empty message, replying with greeting");
            return Ok(self.greeting());
        }

        let reply = self.reply_to(request.message.trim(), request).await?;
        if request.voice && self.tts.is_some() {
            let audio = self.synthesize(&reply.text).await?;
            return Ok(reply.with_audio(audio));
        }
        Ok(reply)
    }

    /// Answer one spoken turn: transcribe, generate, synthesize.
    ///
    /// # Errors
    ///
    /// Returns an error if speech input is disabled, the upload cannot be
    /// staged, or any collaborator fails.
    pub async fn voice_chat(
        &self,
        upload: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<VoiceChatResponse> {
        let stt = self
            .stt
            .as_ref()
            .ok_or_else(|| BotError::Stt("speech input is disabled".to_owned()))?;

        // The staged file lives until the transcription call has finished.
        let staging_dir = self.config.stt.staging_dir.clone();
        let (staged, bytes) = tokio::task::spawn_blocking(move || {
            let mut staged =
                StagedAudio::stage(&upload, file_name.as_deref(), staging_dir.as_deref())?;
            let bytes = staged.read_bytes()?;
            Ok::<_, BotError>((staged, bytes))
        })
        .await
        .map_err(|e| BotError::Audio(format!("staging task failed: {e}")))??;

        let payload = AudioPayload {
            bytes,
            file_name: staged.file_name(),
            mime: staged.format().mime(),
        };
        let transcript = bounded(
            "transcription",
            self.config.stt.timeout_secs,
            stt.transcribe(payload),
        )
        .await?;
        drop(staged);

        info!("transcript: {transcript}");
        if transcript.trim().is_empty() {
            return Ok(VoiceChatResponse::new(transcript, self.greeting()));
        }

        let request = ChatRequest {
            message: transcript.clone(),
            ..ChatRequest::default()
        };
        let mut reply = self.reply_to(transcript.trim(), &request).await?;
        if self.tts.is_some() {
            let audio = self.synthesize(&reply.text).await?;
            reply = reply.with_audio(audio);
        }
        Ok(VoiceChatResponse::new(transcript, reply))
    }

    /// Synthesize speech for arbitrary text.
    ///
    /// # Errors
    ///
    /// Returns an error if speech output is disabled or synthesis fails.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let tts = self
            .tts
            .as_ref()
            .ok_or_else(|| BotError::Tts("speech output is disabled".to_owned()))?;
        bounded("synthesis", self.config.tts.timeout_secs, tts.synthesize(text)).await
    }

    async fn reply_to(&self, message: &str, request: &ChatRequest) -> Result<ChatResponse> {
        let prompt = build_prompt(
            &self.persona,
            &request.history,
            self.config.llm.window(),
            message,
        );
        debug!(
            "prompt assembled: {} chars, {} history turns",
            prompt.len(),
            request.history.len()
        );

        let raw = bounded(
            "generation",
            self.config.llm.timeout_secs,
            self.generator.generate(&prompt),
        )
        .await?;

        let reply = build_response(&raw, self.config.llm.max_chars(), &self.emotions);
        info!(
            "reply ready: {} chars, emotion={}",
            reply.text.chars().count(),
            reply.emotion
        );
        Ok(reply)
    }
}

/// Run `fut` under a timeout of `secs` seconds (at least one).
async fn bounded<T>(what: &str, secs: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let secs = secs.max(1);
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(BotError::Timeout(format!(
            "{what} did not finish within {secs}s"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::PersonaConfig;
    use crate::conversation::ConversationTurn;
    use crate::emotion::EmotionLabel;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that records prompts and replies from a script.
    struct ScriptedGenerator {
        reply: std::result::Result<String, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_owned()),
                delay: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_owned()),
                delay: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok("late".to_owned()),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "gemini"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_owned());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(BotError::Llm)
        }
    }

    struct FixedStt(&'static str);

    #[async_trait]
    impl SpeechToText for FixedStt {
        fn is_configured(&self) -> bool {
            true
        }

        async fn transcribe(&self, audio: AudioPayload) -> Result<String> {
            assert!(!audio.bytes.is_empty());
            Ok(self.0.to_owned())
        }
    }

    /// Transcriber that sees exactly one staged file in `dir`, then fails.
    struct FailingStt {
        dir: std::path::PathBuf,
    }

    #[async_trait]
    impl SpeechToText for FailingStt {
        fn is_configured(&self) -> bool {
            true
        }

        async fn transcribe(&self, _audio: AudioPayload) -> Result<String> {
            assert_eq!(std::fs::read_dir(&self.dir).unwrap().count(), 1);
            Err(BotError::Stt("HTTP 503".to_owned()))
        }
    }

    struct FailingTts;

    #[async_trait]
    impl TextToSpeech for FailingTts {
        fn is_configured(&self) -> bool {
            true
        }

        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            Err(BotError::Tts("HTTP 429".to_owned()))
        }
    }

    struct EchoTts;

    #[async_trait]
    impl TextToSpeech for EchoTts {
        fn is_configured(&self) -> bool {
            true
        }

        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            Ok(format!("MP3:{text}").into_bytes())
        }
    }

    fn test_config() -> BotConfig {
        BotConfig {
            persona: PersonaConfig {
                prompt: Some("You are the food desk.".to_owned()),
                ..PersonaConfig::default()
            },
            ..BotConfig::default()
        }
    }

    fn service_with(generator: Arc<ScriptedGenerator>) -> ChatService {
        ChatService::with_backends(Arc::new(test_config()), generator, None, None).unwrap()
    }

    #[tokio::test]
    async fn empty_message_never_reaches_generator() {
        let generator = ScriptedGenerator::replying("unused");
        let service = service_with(generator.clone());

        for message in ["", "   ", "\n\t"] {
            let request = ChatRequest {
                message: message.to_owned(),
                ..ChatRequest::default()
            };
            let reply = service.chat(&request).await.unwrap();
            assert_eq!(reply.emotion, EmotionLabel::Happy);
            assert_eq!(reply.text, PersonaConfig::default().greeting);
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ven_pongal_turn() {
        let generator =
            ScriptedGenerator::replying("Ven Pongal is a savory rice dish prepared by Maheswari Mam.");
        let service = service_with(generator.clone());

        let request = ChatRequest {
            message: "What is Ven Pongal?".to_owned(),
            history: vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("Vanakkam!"),
            ],
            voice: false,
        };
        let reply = service.chat(&request).await.unwrap();
        assert_eq!(
            reply.text,
            "Ven Pongal is a savory rice dish prepared by Maheswari Mam."
        );
        assert!(reply.audio.is_none());

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("You are the food desk.\n\nCONVERSATION:\nuser: hi\n"));
        assert!(prompts[0].ends_with("user: What is Ven Pongal?\nassistant:"));
    }

    #[tokio::test]
    async fn generator_failure_is_returned_for_the_boundary() {
        let service = service_with(ScriptedGenerator::failing("quota exceeded"));
        let request = ChatRequest {
            message: "hello".to_owned(),
            ..ChatRequest::default()
        };
        let err = service.chat(&request).await.unwrap_err();
        assert!(err.is_upstream());

        let envelope = service.failure_response(&err);
        assert_eq!(envelope.emotion, EmotionLabel::Sad);
        assert_eq!(envelope.text, test_config().failure.apology);
    }

    #[tokio::test]
    async fn error_detail_is_appended_and_capped() {
        let mut config = test_config();
        config.failure.include_error_detail = true;
        let service = ChatService::with_backends(
            Arc::new(config),
            ScriptedGenerator::replying("x"),
            None,
            None,
        )
        .unwrap();

        let err = BotError::Llm("z".repeat(500));
        let envelope = service.failure_response(&err);
        let apology = &test_config().failure.apology;
        assert!(envelope.text.starts_with(apology.as_str()));
        let detail_len = envelope.text.chars().count() - apology.chars().count() - 3;
        assert_eq!(detail_len, ERROR_DETAIL_CHARS);
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let mut config = test_config();
        config.llm.timeout_secs = 1;
        let service = ChatService::with_backends(
            Arc::new(config),
            ScriptedGenerator::slow(Duration::from_secs(5)),
            None,
            None,
        )
        .unwrap();

        let request = ChatRequest {
            message: "hello".to_owned(),
            ..ChatRequest::default()
        };
        let err = service.chat(&request).await.unwrap_err();
        assert!(matches!(err, BotError::Timeout(_)));
    }

    #[tokio::test]
    async fn voice_flag_attaches_audio() {
        let service = ChatService::with_backends(
            Arc::new(test_config()),
            ScriptedGenerator::replying("Happy Pongal!"),
            None,
            Some(Arc::new(EchoTts)),
        )
        .unwrap();

        let request = ChatRequest {
            message: "hello".to_owned(),
            voice: true,
            ..ChatRequest::default()
        };
        let reply = service.chat(&request).await.unwrap();
        assert_eq!(reply.audio.as_deref(), Some(b"MP3:Happy Pongal!".as_slice()));
    }

    #[tokio::test]
    async fn voice_chat_runs_stt_then_llm_then_tts() {
        let generator = ScriptedGenerator::replying("Sakkarai Pongal is sweet!");
        let service = ChatService::with_backends(
            Arc::new(test_config()),
            generator.clone(),
            Some(Arc::new(FixedStt("Tell me about Sakkarai Pongal"))),
            Some(Arc::new(EchoTts)),
        )
        .unwrap();

        let reply = service
            .voice_chat(vec![7u8; 2048], Some("clip.webm".to_owned()))
            .await
            .unwrap();
        assert_eq!(reply.user_text, "Tell me about Sakkarai Pongal");
        assert_eq!(reply.bot_text, "Sakkarai Pongal is sweet!");
        assert_eq!(reply.emotion, EmotionLabel::Excited);
        assert_eq!(
            reply.audio.as_deref(),
            Some(b"MP3:Sakkarai Pongal is sweet!".as_slice())
        );
        assert!(
            generator.prompts.lock().unwrap()[0]
                .ends_with("user: Tell me about Sakkarai Pongal\nassistant:")
        );
    }

    #[tokio::test]
    async fn silent_recording_gets_greeting() {
        let generator = ScriptedGenerator::replying("unused");
        let service = ChatService::with_backends(
            Arc::new(test_config()),
            generator.clone(),
            Some(Arc::new(FixedStt("  "))),
            Some(Arc::new(EchoTts)),
        )
        .unwrap();

        let reply = service.voice_chat(vec![1u8; 2048], None).await.unwrap();
        assert_eq!(reply.emotion, EmotionLabel::Happy);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_fails_the_whole_turn() {
        let generator = ScriptedGenerator::replying("Sakkarai Pongal is sweet!");
        let service = ChatService::with_backends(
            Arc::new(test_config()),
            generator.clone(),
            Some(Arc::new(FixedStt("Tell me about Sakkarai Pongal"))),
            Some(Arc::new(FailingTts)),
        )
        .unwrap();

        let err = service.voice_chat(vec![7u8; 2048], None).await.unwrap_err();
        assert!(matches!(err, BotError::Tts(_)));
        assert!(err.is_upstream());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let request = ChatRequest {
            message: "hello".to_owned(),
            voice: true,
            ..ChatRequest::default()
        };
        assert!(matches!(
            service.chat(&request).await.unwrap_err(),
            BotError::Tts(_)
        ));
    }

    #[tokio::test]
    async fn staged_upload_is_removed_when_transcription_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.stt.staging_dir = Some(dir.path().to_path_buf());
        let generator = ScriptedGenerator::replying("unused");
        let service = ChatService::with_backends(
            Arc::new(config),
            generator.clone(),
            Some(Arc::new(FailingStt {
                dir: dir.path().to_path_buf(),
            })),
            Some(Arc::new(EchoTts)),
        )
        .unwrap();

        let err = service
            .voice_chat(vec![7u8; 2048], Some("clip.webm".to_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Stt(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_speech_is_an_upstream_error() {
        let service = service_with(ScriptedGenerator::replying("x"));
        assert!(service.voice_chat(vec![0; 10], None).await.unwrap_err().is_upstream());
        assert!(service.synthesize("hi").await.unwrap_err().is_upstream());
        assert!(!service.stt_configured());
        assert!(!service.tts_configured());
    }
}
