//! HTTP front end for the avatar UI.
//!
//! ## Endpoints
//!
//! - `GET /` — liveness banner
//! - `GET /health` — which collaborators have credentials
//! - `GET /menu` — the event menu
//! - `POST /chat` — one text turn
//! - `POST /voice-chat` — one spoken turn (multipart upload)
//! - `POST /tts` — synthesize arbitrary text
//!
//! Upstream failures are answered with the failure envelope and HTTP 500.
//! CORS is fully permissive.

use crate::config::ServerConfig;
use crate::conversation::ChatRequest;
use crate::error::{BotError, Result};
use crate::service::ChatService;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Body of `POST /tts`.
#[derive(Debug, Default, Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application router around a shared service.
pub fn router(service: Arc<ChatService>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/menu", get(handle_menu))
        .route("/chat", post(handle_chat))
        .route("/voice-chat", post(handle_voice_chat))
        .route("/tts", post(handle_tts))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }),
        )
        .with_state(service)
}

// ---------------------------------------------------------------------------
// ChatServer
// ---------------------------------------------------------------------------

/// Running HTTP server.
///
/// Serves in a background tokio task until [`shutdown`](Self::shutdown) is
/// called or the value is dropped.
pub struct ChatServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ChatServer {
    /// Start serving.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign).
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(service: Arc<ChatService>, config: &ServerConfig) -> Result<Self> {
        let app = router(service, config.max_body_bytes);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| BotError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BotError::Server(format!("failed to get local addr: {e}")))?;

        info!("chat server listening on http://{addr}");

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                error!("chat server error: {e}");
            }
        });

        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!("chat server task ended abnormally: {e}");
        }
        info!("chat server stopped");
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Failure envelope with the given status.
fn failure(service: &ChatService, status: StatusCode, err: &BotError) -> Response {
    error!("request failed: {err}");
    (status, Json(service.failure_response(err))).into_response()
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /`
async fn handle_root(State(service): State<Arc<ChatService>>) -> Json<Value> {
    let persona = &service.config().persona;
    Json(json!({
        "status": format!("{} API is running", persona.bot_name),
        "event": persona.event,
    }))
}

/// `GET /health`
async fn handle_health(State(service): State<Arc<ChatService>>) -> Json<Value> {
    let mut body = Map::new();
    body.insert("status".into(), json!("healthy"));
    body.insert("event".into(), json!(service.config().persona.event));
    body.insert(
        format!("{}_configured", service.generator_name()),
        json!(service.llm_configured()),
    );
    body.insert("stt_configured".into(), json!(service.stt_configured()));
    body.insert("tts_configured".into(), json!(service.tts_configured()));
    Json(Value::Object(body))
}

/// `GET /menu`
async fn handle_menu(State(service): State<Arc<ChatService>>) -> impl IntoResponse {
    Json(service.menu())
}

/// `POST /chat`
///
/// The body is decoded field by field; a malformed field takes its default
/// and a body that is not a JSON object is answered with the greeting.
async fn handle_chat(State(service): State<Arc<ChatService>>, body: Bytes) -> Response {
    let request = ChatRequest::from_json_lenient(&body);
    info!(
        "chat: {} chars, {} history turns, voice={}",
        request.message.chars().count(),
        request.history.len(),
        request.voice
    );

    match service.chat(&request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => failure(&service, StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

/// `POST /voice-chat`
///
/// Takes the first non-empty multipart field, whatever its name.
async fn handle_voice_chat(
    State(service): State<Arc<ChatService>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            let err = BotError::Audio(format!("expected a multipart upload: {e}"));
            return failure(&service, StatusCode::BAD_REQUEST, &err);
        }
    };
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let err = BotError::Audio(format!("malformed multipart body: {e}"));
                return failure(&service, StatusCode::BAD_REQUEST, &err);
            }
        };
        let file_name = field.file_name().map(str::to_owned);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                let err = BotError::Audio(format!("upload read failed: {e}"));
                return failure(&service, StatusCode::BAD_REQUEST, &err);
            }
        };
        if !data.is_empty() {
            upload = Some((data.to_vec(), file_name));
            break;
        }
    }

    let Some((bytes, file_name)) = upload else {
        let err = BotError::Audio("no audio in upload".to_owned());
        return failure(&service, StatusCode::BAD_REQUEST, &err);
    };
    info!("voice chat: {} byte upload", bytes.len());

    match service.voice_chat(bytes, file_name).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => failure(&service, StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

/// `POST /tts`
async fn handle_tts(State(service): State<Arc<ChatService>>, body: Bytes) -> Response {
    let request = serde_json::from_slice::<TtsRequest>(&body).unwrap_or_else(|e| {
        warn!("unparseable tts body ({e}), treating as empty");
        TtsRequest::default()
    });
    let text = request.text.trim();
    if text.is_empty() {
        let err = BotError::Tts("no text to speak".to_owned());
        return failure(&service, StatusCode::BAD_REQUEST, &err);
    }

    match service.synthesize(text).await {
        Ok(audio) => (
            [(header::CONTENT_TYPE, service.tts_content_type())],
            audio,
        )
            .into_response(),
        Err(e) => failure(&service, StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}
