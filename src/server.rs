//! HTTP "brain service".
//!
//! Exposes the ask flow behind an OpenAI-compatible API, so chat frontends
//! (Open WebUI, scripts, editors) talk to this service instead of directly
//! to the model server, plus endpoints that trigger ingestion.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, index location and size |
//! | `GET`  | `/v1/models` | The configured chat model, OpenAI list shape |
//! | `POST` | `/v1/chat/completions` | OpenAI-style chat turn with retrieval |
//! | `POST` | `/chat` | `{ "prompt": ... }` → `{ "reply": ..., "raw": ... }` |
//! | `POST` | `/ingest/live` | Ingest new live-log lines |
//! | `POST` | `/ingest/rebuild` | Rebuild the `bulk_export` partition |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no user content found in messages" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `timeout` (408), `upstream_error` (502), `internal` (500).
//!
//! Ingestion endpoints share one lock, so at most one ingestion runs at a
//! time per server.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::ask::{api_system_prompt, AskOutcome, AskRequest, Assistant};
use crate::chat::{ChatBackend, OpenAiCompatChat};
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::cursor::FileCursorStore;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{AskError, ChatError, EmbedError, IngestError, RetrievalError};
use crate::ingest::{Ingestor, LiveIngestReport, RebuildReport};
use crate::interaction_log::InteractionLog;
use crate::store::sqlite::SqliteStore;
use crate::store::IndexStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn IndexStore>,
    assistant: Arc<Assistant>,
    ingestor: Arc<Ingestor>,
    ingest_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Wire the service from explicit backends.
    pub fn new(
        config: &Config,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        let assembler = ContextAssembler::new(store.clone(), embedder.clone(), &config.retrieval);
        let assistant = Assistant::new(
            assembler,
            chat,
            InteractionLog::new(&config.paths.live_log),
        );
        let ingestor = Ingestor::new(
            config,
            store.clone(),
            embedder,
            Arc::new(FileCursorStore::new(&config.paths.cursor)),
        );

        Self {
            config: Arc::new(config.clone()),
            store,
            assistant: Arc::new(assistant),
            ingestor: Arc::new(ingestor),
            ingest_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wire the service from configuration: SQLite index, configured
    /// embedder and OpenAI-compatible chat backend.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn IndexStore> = Arc::new(SqliteStore::open(config).await?);
        let embedder = create_embedder(&config.embedding)?;
        let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiCompatChat::new(&config.chat)?);
        Ok(Self::new(config, store, embedder, chat))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/chat", post(handle_chat))
        .route("/ingest/live", post(handle_ingest_live))
        .route("/ingest/rebuild", post(handle_ingest_rebuild))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("brain service listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<EmbedError> for AppError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::Disabled => {
                AppError::new(StatusCode::BAD_REQUEST, "embeddings_disabled", err.to_string())
            }
            EmbedError::Timeout(_) => {
                AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", err.to_string())
            }
            _ => AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Timeout(_) => {
                AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", err.to_string())
            }
            _ => AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string()),
        }
    }
}

impl From<AskError> for AppError {
    fn from(err: AskError) -> Self {
        match err {
            AskError::Retrieval(RetrievalError::Embed(e)) => e.into(),
            AskError::Retrieval(RetrievalError::Store(e)) => internal(e.to_string()),
            AskError::Chat(e) => e.into(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Embed(e) => e.into(),
            other => internal(other.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index_path: String,
    index_exists: bool,
    entries: Option<u64>,
    chat: ChatInfo,
}

#[derive(Serialize)]
struct ChatInfo {
    base_url: String,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index_path = state.config.paths.index_db();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index_exists: index_path.exists(),
        index_path: index_path.display().to_string(),
        entries: state.store.count(None).await.ok(),
        chat: ChatInfo {
            base_url: state.config.chat.base_url.clone(),
            model: state.assistant.default_model().to_string(),
        },
    })
}

// ============ GET /v1/models ============

async fn handle_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": state.assistant.default_model(),
            "object": "model",
            "owned_by": "local-brain",
        }],
    }))
}

// ============ POST /v1/chat/completions ============

/// OpenAI chat message; `content` may be a string or a list of parts.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl IncomingMessage {
    fn text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    serde_json::Value::String(s) => Some(s.as_str()),
                    _ => p.get("text").and_then(|t| t.as_str()),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// Sampling fields (`temperature`, `max_tokens`, `stream`) are accepted
/// and ignored; the configured values are used.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<IncomingMessage>,
}

/// Join user and system messages separately, each with a blank line.
fn split_messages(messages: &[IncomingMessage]) -> (String, String) {
    let mut user = Vec::new();
    let mut system = Vec::new();
    for m in messages {
        match m.role.as_str() {
            "user" => user.push(m.text()),
            "system" => system.push(m.text()),
            _ => {}
        }
    }
    (
        user.join("\n\n").trim().to_string(),
        system.join("\n\n").trim().to_string(),
    )
}

fn completion_response(outcome: &AskOutcome, created: i64) -> serde_json::Value {
    serde_json::json!({
        "id": format!("chatcmpl-localbrain-{}", created),
        "object": "chat.completion",
        "created": created,
        "model": outcome.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": outcome.reply },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 0,
            "completion_tokens": 0,
            "total_tokens": 0,
        },
    })
}

async fn run_completion(
    state: &AppState,
    request: ChatCompletionRequest,
    source: &str,
) -> Result<serde_json::Value, AppError> {
    let (prompt, client_system) = split_messages(&request.messages);
    if prompt.is_empty() {
        return Err(bad_request("no user content found in messages"));
    }

    let outcome = state
        .assistant
        .ask(&AskRequest {
            prompt,
            system_prompt: api_system_prompt(&client_system),
            use_rag: true,
            model: request.model,
            source: source.to_string(),
        })
        .await?;

    Ok(completion_response(
        &outcome,
        chrono::Utc::now().timestamp(),
    ))
}

async fn handle_chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(run_completion(&state, request, "web").await?))
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
pub struct SimpleChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<SimpleChatRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let completion = ChatCompletionRequest {
        model: request.model,
        messages: vec![IncomingMessage {
            role: "user".to_string(),
            content: serde_json::Value::String(request.prompt),
        }],
    };
    let raw = run_completion(&state, completion, "cli").await?;
    let reply = raw["choices"][0]["message"]["content"].clone();

    Ok(Json(serde_json::json!({ "reply": reply, "raw": raw })))
}

// ============ POST /ingest/* ============

async fn handle_ingest_live(
    State(state): State<AppState>,
) -> Result<Json<LiveIngestReport>, AppError> {
    let _guard = state.ingest_lock.lock().await;
    Ok(Json(state.ingestor.ingest_live().await?))
}

async fn handle_ingest_rebuild(
    State(state): State<AppState>,
) -> Result<Json<RebuildReport>, AppError> {
    let _guard = state.ingest_lock.lock().await;
    Ok(Json(state.ingestor.rebuild_index().await?))
}
