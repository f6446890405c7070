//! Double-submit-cookie CSRF guard.
//!
//! `GET /api/csrf-token` issues a random token twice: as an `HttpOnly`,
//! `SameSite=Strict` cookie and in the JSON body. Same-origin script reads
//! the body and echoes the value in the `X-CSRF-Token` header on every
//! mutating request. [`require_csrf`] admits such a request only when the
//! cookie and the header are both present and equal. No server-side
//! session state is kept.

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::server::{AppError, AppState};

pub const CSRF_COOKIE: &str = "fishki_csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const TOKEN_BYTES: usize = 32;
/// Cookie lifetime in seconds (24 hours).
pub const TOKEN_MAX_AGE: u64 = 86_400;

/// A fresh base64-encoded token from the OS random source.
pub fn generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut bytes)?;
    Ok(STANDARD.encode(bytes))
}

pub fn token_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        CSRF_COOKIE, token, TOKEN_MAX_AGE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of cookie `name` from all `Cookie` headers, if present.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Whether a request with these headers passes the double-submit check.
pub fn tokens_match(headers: &HeaderMap) -> bool {
    let Some(cookie) = cookie_value(headers, CSRF_COOKIE) else {
        return false;
    };
    let Some(header) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    !cookie.is_empty() && constant_time_eq(cookie.as_bytes(), header.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Safe methods never change state and skip the guard.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Middleware rejecting mutating requests without a matching token pair.
pub async fn require_csrf(request: Request, next: Next) -> Response {
    if is_safe_method(request.method()) || tokens_match(request.headers()) {
        return next.run(request).await;
    }
    debug!(method = %request.method(), uri = %request.uri(), "csrf check failed");
    AppError::new(
        StatusCode::FORBIDDEN,
        "csrf_failed",
        "missing or mismatched CSRF token",
    )
    .into_response()
}

#[derive(Serialize)]
struct TokenResponse {
    #[serde(rename = "csrfToken")]
    csrf_token: String,
}

/// `GET /api/csrf-token`
pub async fn handle_csrf_token(State(state): State<AppState>) -> Result<Response, AppError> {
    let token = generate_token().map_err(|e| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("failed to generate token: {}", e),
        )
    })?;
    let secure = state.config.snapshot().csrf.secure_cookie;
    let cookie = HeaderValue::from_str(&token_cookie(&token, secure)).map_err(|e| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    })?;

    let mut response = Json(TokenResponse { csrf_token: token }).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}
