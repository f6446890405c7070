//! HTTP server for the wiki API.
//!
//! Wraps the [`Wiki`] orchestrator in a JSON API consumed by the browser
//! frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/api/files` | Page tree under a synthetic root folder |
//! | `GET`    | `/api/load?filename=` | Raw page content |
//! | `POST`   | `/api/save` | Write, commit and push a page |
//! | `DELETE` | `/api/delete` | Remove, commit and push a page |
//! | `POST`   | `/api/render` | Render markdown to HTML |
//! | `POST`   | `/api/init` | Initialise a repository and adopt it as the wiki root |
//! | `POST`   | `/api/pull` | Pull with rebase |
//! | `POST`   | `/api/push` | Push to the upstream branch |
//! | `POST`   | `/api/fetch` | Fetch from the remote |
//! | `GET`    | `/api/status` | Branch, divergence and change counts |
//! | `GET`    | `/api/csrf-token` | Issue a CSRF cookie and token |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "not found: notes/a.md" } }
//! ```
//!
//! VCS failures add a `details` field with the captured tool output.
//!
//! Error codes: `bad_request`, `invalid_path`, `not_configured` (400),
//! `csrf_failed` (403), `not_found` (404), `not_a_repository`, `no_remote`,
//! `unclean_working_tree` (409), `rate_limited` (429), `vcs_failed`,
//! `internal` (500).
//!
//! # Middleware
//!
//! From the outside in: security headers, request tracing, rate limiting
//! and the CSRF guard. The last two only look at mutating methods.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use fishki_core::{PageNode, RateLimiter, Vcs};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ConfigHandle;
use crate::csrf::{handle_csrf_token, require_csrf};
use crate::error::WikiError;
use crate::render::render_markdown;
use crate::security::{rate_limit, security_headers, spawn_sweeper};
use crate::wiki::{RepoSummary, SyncOutcome, Wiki};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub wiki: Arc<Wiki>,
    pub limiter: Arc<RateLimiter>,
    pub config: ConfigHandle,
}

impl AppState {
    /// State for `config`, with a rate limiter sized from its `[rate_limit]`
    /// section.
    pub fn new(config: ConfigHandle, vcs: Arc<dyn Vcs>) -> Self {
        let limits = config.snapshot().rate_limit.clone();
        Self {
            wiki: Arc::new(Wiki::new(config.clone(), vcs)),
            limiter: Arc::new(RateLimiter::new(limits.window(), limits.max_requests)),
            config,
        }
    }
}

/// The full application router with all middleware applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/files", get(handle_files))
        .route("/api/load", get(handle_load))
        .route("/api/save", post(handle_save))
        .route("/api/delete", delete(handle_delete))
        .route("/api/render", post(handle_render))
        .route("/api/init", post(handle_init))
        .route("/api/pull", post(handle_pull))
        .route("/api/push", post(handle_push))
        .route("/api/fetch", post(handle_fetch))
        .route("/api/status", get(handle_status))
        .route("/api/csrf-token", get(handle_csrf_token))
        .layer(middleware::from_fn(require_csrf))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: ConfigHandle, vcs: Arc<dyn Vcs>) -> anyhow::Result<()> {
    let bind_addr = config.snapshot().server.bind.clone();
    let state = AppState::new(config, vcs);
    let sweeper = spawn_sweeper(&state.limiter);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "fishki listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    sweeper.abort();
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
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<WikiError> for AppError {
    fn from(err: WikiError) -> Self {
        let status = match &err {
            WikiError::InvalidPath(_)
            | WikiError::InvalidRequest(_)
            | WikiError::ConfigurationMissing => StatusCode::BAD_REQUEST,
            WikiError::NotFound(_) => StatusCode::NOT_FOUND,
            WikiError::Vcs(fishki_core::VcsError::OperationFailed { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            WikiError::Vcs(_) => StatusCode::CONFLICT,
            WikiError::Io { .. } | WikiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "request failed");
        }
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details().map(str::to_string),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
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

// ============ GET /api/files ============

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<PageNode>,
}

async fn handle_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, AppError> {
    let root = state.wiki.list().await?;
    Ok(Json(FilesResponse { files: vec![root] }))
}

// ============ GET /api/load ============

#[derive(Deserialize)]
struct LoadQuery {
    #[serde(default)]
    filename: String,
}

async fn handle_load(
    State(state): State<AppState>,
    Query(query): Query<LoadQuery>,
) -> Result<Response, AppError> {
    let content = state.wiki.load(&query.filename).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], content).into_response())
}

// ============ POST /api/save, DELETE /api/delete ============

#[derive(Deserialize)]
struct SaveRequest {
    filename: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct DeleteRequest {
    filename: String,
}

/// Body returned by mutating page operations.
#[derive(Serialize)]
struct SyncResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        Self {
            status: "ok",
            warning: outcome.warning().map(str::to_string),
        }
    }
}

async fn handle_save(
    State(state): State<AppState>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    let Json(req) = payload?;
    let outcome = state.wiki.save(&req.filename, req.content.as_bytes()).await?;
    Ok(Json(outcome.into()))
}

async fn handle_delete(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    let Json(req) = payload?;
    let outcome = state.wiki.delete(&req.filename).await?;
    Ok(Json(outcome.into()))
}

// ============ POST /api/render ============

#[derive(Deserialize)]
struct RenderRequest {
    #[serde(default)]
    markdown: String,
}

async fn handle_render(
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Html<String>, AppError> {
    let Json(req) = payload?;
    if req.markdown.is_empty() {
        return Err(bad_request("markdown must not be empty"));
    }
    Ok(Html(render_markdown(&req.markdown)))
}

// ============ POST /api/init ============

#[derive(Deserialize)]
struct InitRequest {
    path: PathBuf,
}

#[derive(Serialize)]
struct OkResponse {
    status: &'static str,
}

const OK: OkResponse = OkResponse { status: "ok" };

async fn handle_init(
    State(state): State<AppState>,
    payload: Result<Json<InitRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let Json(req) = payload?;
    state.wiki.init(&req.path).await?;
    Ok(Json(OK))
}

// ============ POST /api/pull, /api/push, /api/fetch ============

async fn handle_pull(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    state.wiki.pull().await?;
    Ok(Json(OK))
}

async fn handle_push(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    state.wiki.push().await?;
    Ok(Json(OK))
}

async fn handle_fetch(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    state.wiki.fetch().await?;
    Ok(Json(OK))
}

// ============ GET /api/status ============

async fn handle_status(State(state): State<AppState>) -> Result<Json<RepoSummary>, AppError> {
    Ok(Json(state.wiki.status().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fishki_core::VcsError;

    #[test]
    fn test_wiki_errors_map_to_statuses() {
        let cases: Vec<(WikiError, StatusCode)> = vec![
            (WikiError::ConfigurationMissing, StatusCode::BAD_REQUEST),
            (WikiError::NotFound("a.md".into()), StatusCode::NOT_FOUND),
            (
                VcsError::NoRemoteConfigured(PathBuf::from("/w")).into(),
                StatusCode::CONFLICT,
            ),
            (
                VcsError::failed("push", "exit status: 1", "rejected").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let code = err.code();
            let app: AppError = err.into();
            assert_eq!(app.status, status, "{}", code);
            assert_eq!(app.code, code);
        }
    }

    #[test]
    fn test_vcs_output_goes_to_details() {
        let app: AppError = WikiError::from(VcsError::failed("push", "exit status: 1", "rejected")).into();
        assert_eq!(app.message, "push failed: exit status: 1");
        assert_eq!(app.details.as_deref(), Some("rejected"));
    }
}
