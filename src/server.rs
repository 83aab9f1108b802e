//! Password-gated HTTP chat API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/auth` | Exchange the shared password for a session token |
//! | `POST` | `/chat` | Ask a question within an authenticated session |
//! | `POST` | `/refresh` | Rebuild the corpus from the document directory |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one JSON shape:
//!
//! ```json
//! { "error": { "code": "invalid_token", "message": "unknown or expired session" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_credentials` (401),
//! `invalid_token` (401), `synthesis_error` (502), `internal` (500).
//!
//! # Sessions
//!
//! `/auth` mints a random session id and a token derived from it with
//! HMAC-SHA256 keyed by the shared password, so a token cannot be forged
//! without knowing the password. Each session serializes its own questions
//! behind a mutex (answers commit to history in submission order) while
//! distinct sessions proceed concurrently. A session expires after an hour
//! of inactivity, and the registry holds at most [`MAX_SESSIONS`] entries
//! (the stalest session is evicted to make room); either way the next
//! request with that session id gets `invalid_token`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::chat::{answer_question, ChatSession};
use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::extract::ExtractorRegistry;
use crate::synthesis::{SynthesisClient, SynthesisError};

type HmacSha256 = Hmac<Sha256>;

/// A session is dropped after this long without a chat request.
const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Hard cap on concurrently tracked sessions.
const MAX_SESSIONS: usize = 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<CorpusStore>,
    registry: Arc<ExtractorRegistry>,
    synthesizer: Arc<dyn SynthesisClient>,
    sessions: Arc<SessionStore>,
    /// The shared access password, read once at startup.
    password: String,
}

// ============ Session registry ============

struct SessionEntry {
    /// Each session carries its own mutex so one slow synthesis call only
    /// blocks that session, not the registry.
    session: Arc<Mutex<ChatSession>>,
    last_seen: Instant,
}

/// In-memory session registry with a last-activity TTL and a hard size cap,
/// so a long-running server does not accumulate every login ever made.
struct SessionStore {
    ttl: Duration,
    cap: usize,
    inner: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            ttl,
            cap,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh session. Expired entries are swept first; if the
    /// registry is still full, the stalest session is evicted.
    async fn create(&self, session_id: String) {
        let mut map = self.inner.write().await;
        map.retain(|_, entry| entry.last_seen.elapsed() < self.ttl);
        while map.len() >= self.cap {
            let stalest = map
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match stalest {
                Some(id) => map.remove(&id),
                None => break,
            };
        }
        map.insert(
            session_id,
            SessionEntry {
                session: Arc::new(Mutex::new(ChatSession::new())),
                last_seen: Instant::now(),
            },
        );
    }

    /// Look up a live session, bumping its activity timestamp. An expired
    /// entry is removed and reported as absent.
    async fn checkout(&self, session_id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        let mut map = self.inner.write().await;
        let live = map
            .get(session_id)
            .map(|entry| entry.last_seen.elapsed() < self.ttl)
            .unwrap_or(false);
        if !live {
            map.remove(session_id);
            return None;
        }
        let entry = map.get_mut(session_id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Starts the HTTP server.
///
/// The corpus must already be built; the server refuses to start otherwise,
/// which is why the caller passes an initialized [`CorpusStore`]. Runs until
/// the process is terminated.
pub async fn run_server(
    config: &Config,
    store: Arc<CorpusStore>,
    registry: Arc<ExtractorRegistry>,
    synthesizer: Arc<dyn SynthesisClient>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let password = std::env::var(&config.auth.password_env).map_err(|_| {
        anyhow::anyhow!("{} environment variable not set", config.auth.password_env)
    })?;
    if password.is_empty() {
        anyhow::bail!("{} must not be empty", config.auth.password_env);
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        registry,
        synthesizer,
        sessions: Arc::new(SessionStore::new(SESSION_TTL, MAX_SESSIONS)),
        password,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/auth", post(handle_auth))
        .route("/chat", post(handle_chat))
        .route("/refresh", post(handle_refresh))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Session tokens ============

/// Derive the token for a session id: hex HMAC-SHA256 keyed by the password.
fn session_token(password: &str, session_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(password.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(session_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn token_is_valid(password: &str, session_id: &str, token: &str) -> bool {
    // Constant-ish comparison is not needed here: the token is full-entropy
    // HMAC output, so prefix timing reveals nothing recoverable.
    session_token(password, session_id) == token
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

/// Internal error type that converts into an Axum HTTP response.
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

fn invalid_credentials() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "invalid_credentials".to_string(),
        message: "wrong password".to_string(),
    }
}

fn invalid_token() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "invalid_token".to_string(),
        message: "unknown or expired session".to_string(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map a chat-flow failure to an HTTP error. Synthesis failures are the
/// upstream's fault and surface as 502; everything else is ours. Request
/// validation (empty message) is handled in the handler before the flow
/// runs, so it never reaches this classifier.
fn classify_chat_error(err: anyhow::Error) -> AppError {
    if let Some(synth) = err.downcast_ref::<SynthesisError>() {
        return AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "synthesis_error".to_string(),
            message: synth.to_string(),
        };
    }
    internal(err.to_string())
}

// ============ POST /auth ============

#[derive(Deserialize)]
struct AuthRequest {
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    session_id: String,
    token: String,
}

/// Handler for `POST /auth`. A wrong password gets a 401 and nothing else;
/// there is no lockout or throttling on this shared-secret gate.
async fn handle_auth(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.password != state.password {
        return Err(invalid_credentials());
    }

    let session_id = Uuid::new_v4().to_string();
    let token = session_token(&state.password, &session_id);
    state.sessions.create(session_id.clone()).await;

    Ok(Json(AuthResponse { session_id, token }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    token: String,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

/// Handler for `POST /chat`.
///
/// Holds the session mutex for the duration of the answer so questions in
/// one session commit to history strictly in submission order. The corpus
/// snapshot is taken before answering; a concurrent refresh affects the next
/// question, never this one.
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if !token_is_valid(&state.password, &req.session_id, &req.token) {
        return Err(invalid_token());
    }
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let session = state
        .sessions
        .checkout(&req.session_id)
        .await
        .ok_or_else(invalid_token)?;

    let snapshot = state.store.snapshot().await;
    let mut session = session.lock().await;
    let answer = answer_question(
        &state.config,
        &snapshot.corpus,
        &snapshot.retriever,
        state.synthesizer.as_ref(),
        &mut session,
        &req.message,
    )
    .await
    .map_err(classify_chat_error)?;

    Ok(Json(ChatResponse { answer }))
}

// ============ POST /refresh ============

#[derive(Deserialize)]
struct RefreshRequest {
    session_id: String,
    token: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    version: u64,
    files: Vec<String>,
}

/// Handler for `POST /refresh`. Rebuilds the corpus wholesale; on failure
/// the previous corpus version stays live and the error is reported.
async fn handle_refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    if !token_is_valid(&state.password, &req.session_id, &req.token) {
        return Err(invalid_token());
    }

    let snapshot = state
        .store
        .refresh(&state.config, &state.registry)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(RefreshResponse {
        version: snapshot.version,
        files: snapshot.corpus.files.clone(),
    }))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_for_the_right_password() {
        let token = session_token("hunter2", "session-1");
        assert!(token_is_valid("hunter2", "session-1", &token));
    }

    #[test]
    fn token_fails_for_other_sessions_or_passwords() {
        let token = session_token("hunter2", "session-1");
        assert!(!token_is_valid("hunter2", "session-2", &token));
        assert!(!token_is_valid("changed", "session-1", &token));
        assert!(!token_is_valid("hunter2", "session-1", "deadbeef"));
    }

    #[test]
    fn token_is_hex_encoded_sha256_length() {
        let token = session_token("pw", "id");
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn live_session_checks_out() {
        let store = SessionStore::new(Duration::from_secs(3600), 16);
        store.create("s1".to_string()).await;
        assert!(store.checkout("s1").await.is_some());
        assert!(store.checkout("nope").await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_removed_on_checkout() {
        // Zero TTL: every entry is expired by the time it is looked up.
        let store = SessionStore::new(Duration::ZERO, 16);
        store.create("s1".to_string()).await;
        assert!(store.checkout("s1").await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn session_count_is_capped_by_evicting_the_stalest() {
        let store = SessionStore::new(Duration::from_secs(3600), 2);
        store.create("first".to_string()).await;
        std::thread::sleep(Duration::from_millis(5));
        store.create("second".to_string()).await;
        std::thread::sleep(Duration::from_millis(5));
        store.create("third".to_string()).await;

        assert_eq!(store.len().await, 2);
        assert!(store.checkout("first").await.is_none());
        assert!(store.checkout("second").await.is_some());
        assert!(store.checkout("third").await.is_some());
    }

    #[tokio::test]
    async fn checkout_keeps_an_active_session_alive() {
        let store = SessionStore::new(Duration::from_millis(200), 16);
        store.create("s1".to_string()).await;
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(50));
            assert!(store.checkout("s1").await.is_some());
        }
    }

    #[test]
    fn synthesis_failures_map_to_bad_gateway() {
        let err = anyhow::Error::new(SynthesisError::Timeout);
        let mapped = classify_chat_error(err);
        assert_eq!(mapped.status, StatusCode::BAD_GATEWAY);
        assert_eq!(mapped.code, "synthesis_error");
    }

    #[test]
    fn non_synthesis_failures_map_to_internal() {
        // Internal errors mentioning "empty" (e.g. an empty embedding
        // response) are still the server's fault, not the caller's.
        let err = anyhow::anyhow!("empty embedding response");
        let mapped = classify_chat_error(err);
        assert_eq!(mapped.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mapped.code, "internal");
    }
}
