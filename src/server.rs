//! HTTP chat API.
//!
//! Serves the same single-turn conversation as the terminal shell, one
//! in-memory [`Session`] per client conversation. Turns within a session are
//! serialized by a per-session lock; distinct sessions proceed concurrently.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Start a session, returns its id |
//! | `GET`    | `/sessions/{id}/messages` | Transcript of a session |
//! | `POST`   | `/sessions/{id}/messages` | Run one turn: `{"content": "..."}` |
//! | `DELETE` | `/sessions/{id}` | Tear a session down |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "answer_service_error", "message": "answer service error: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `embedding_error` / `answer_service_error` (502), `store_unavailable` (503).
//! A failed turn still records the user message in the session. Malformed
//! session ids and request bodies are reported as `bad_request`.
//!
//! # Session lifetime
//!
//! Sessions idle for longer than `[server].session_ttl_secs` are dropped,
//! both lazily on lookup and by a periodic sweep. A session with a turn in
//! flight is never dropped.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from another origin.

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Error;
use crate::models::Message;
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::session::Session;

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
}

impl SessionSlot {
    /// Idle past `ttl` and not held by any request.
    fn is_expired(&self, ttl: Duration) -> bool {
        Arc::strong_count(&self.session) == 1 && self.last_used.elapsed() > ttl
    }
}

/// In-memory sessions with idle expiry.
struct SessionStore {
    ttl: Duration,
    slots: RwLock<HashMap<Uuid, SessionSlot>>,
}

impl SessionStore {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, session: Session) {
        let id = session.id;
        let slot = SessionSlot {
            session: Arc::new(Mutex::new(session)),
            last_used: Instant::now(),
        };
        self.slots.write().await.insert(id, slot);
    }

    /// Look up a live session and mark it used. Expired sessions are removed.
    async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        let mut slots = self.slots.write().await;
        if slots.get(&id)?.is_expired(self.ttl) {
            slots.remove(&id);
            debug!(session = %id, "session expired");
            return None;
        }
        let slot = slots.get_mut(&id)?;
        slot.last_used = Instant::now();
        Some(slot.session.clone())
    }

    async fn touch(&self, id: Uuid) {
        if let Some(slot) = self.slots.write().await.get_mut(&id) {
            slot.last_used = Instant::now();
        }
    }

    async fn remove(&self, id: Uuid) -> bool {
        self.slots.write().await.remove(&id).is_some()
    }

    /// Drop every expired session, returning how many were dropped.
    async fn evict_idle(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(self.ttl));
        before - slots.len()
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))
    }
}

/// Periodically evict idle sessions until the store is dropped.
fn spawn_idle_sweep(sessions: Weak<SessionStore>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(sessions) = sessions.upgrade() else {
                break;
            };
            let evicted = sessions.evict_idle().await;
            if evicted > 0 {
                info!(evicted, "evicted idle sessions");
            }
        }
    });
}

/// Build the router and start its idle-session sweep. Exposed separately
/// from [`run_server`] so tests can drive it on an ephemeral port.
///
/// Must be called from within a tokio runtime.
pub fn router(orchestrator: Arc<Orchestrator>, session_ttl: Duration) -> Router {
    let sessions = Arc::new(SessionStore::new(session_ttl));
    spawn_idle_sweep(
        Arc::downgrade(&sessions),
        (session_ttl / 2).max(Duration::from_millis(100)),
    );

    let state = AppState {
        orchestrator,
        sessions,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}/messages",
            get(handle_list_messages).post(handle_post_message),
        )
        .route("/sessions/{id}", axum::routing::delete(handle_delete_session))
        .layer(cors)
        .with_state(state)
}

/// Starts the chat API on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(
        orchestrator,
        Duration::from_secs(config.server.session_ttl_secs),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "chat API listening");
    println!("Chat API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Maps a failed turn to its HTTP status. Remote failures are reported as
/// a bad gateway; the session itself stays usable.
impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Embedding(_) | Error::AnswerService(_) => StatusCode::BAD_GATEWAY,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Extractors ============

/// The `{id}` path segment, rejected with the JSON error contract when it is
/// not a UUID.
struct SessionId(Uuid);

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        Ok(SessionId(id))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sessions ============

#[derive(Serialize)]
struct SessionResponse {
    id: Uuid,
    created_at: DateTime<Utc>,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let session = Session::new();
    let body = SessionResponse {
        id: session.id,
        created_at: session.created_at,
    };
    state.sessions.insert(session).await;

    (StatusCode::CREATED, Json(body))
}

// ============ GET /sessions/{id}/messages ============

#[derive(Serialize)]
struct TranscriptResponse {
    id: Uuid,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

async fn handle_list_messages(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<Json<TranscriptResponse>, AppError> {
    let session = state.session(id).await?;
    let session = session.lock().await;

    Ok(Json(TranscriptResponse {
        id: session.id,
        created_at: session.created_at,
        messages: session.messages().to_vec(),
    }))
}

// ============ POST /sessions/{id}/messages ============

#[derive(Deserialize)]
struct TurnRequest {
    content: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum TurnResponse {
    Answered {
        answer: String,
        citations: Vec<String>,
    },
    Ignored,
}

async fn handle_post_message(
    State(state): State<AppState>,
    SessionId(id): SessionId,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let session = state.session(id).await?;
    let outcome = {
        let mut session = session.lock().await;
        state.orchestrator.handle_turn(&mut session, &req.content).await
    };
    drop(session);
    state.sessions.touch(id).await;

    match outcome {
        TurnOutcome::Ignored => Ok(Json(TurnResponse::Ignored)),
        TurnOutcome::Answered { answer, citations } => {
            Ok(Json(TurnResponse::Answered { answer, citations }))
        }
        TurnOutcome::Failed { error } => Err(error.into()),
    }
}

// ============ DELETE /sessions/{id} ============

async fn handle_delete_session(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}
