//! Request admission and response hardening middleware.
//!
//! - [`rate_limit`] applies the shared [`RateLimiter`] to mutating requests,
//!   keyed by [`client_identity`].
//! - [`security_headers`] stamps every response with a restrictive CSP and
//!   the usual browser hardening headers.
//! - [`spawn_sweeper`] keeps the limiter's map from growing with clients
//!   that went away.
//!
//! # Client identity
//!
//! With `rate_limit.trust_forwarded_for` enabled the first
//! `X-Forwarded-For` entry wins over the peer address. The header is
//! client-controlled: unless a trusted proxy overwrites it, a client can
//! rotate identities freely and the per-client limit becomes advisory.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, RETRY_AFTER, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use fishki_core::RateLimiter;
use tracing::{debug, warn};

use crate::csrf::is_safe_method;
use crate::server::{AppError, AppState};

pub const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; \
script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; \
img-src 'self' data:; connect-src 'self'; font-src 'self'; object-src 'none'; \
frame-ancestors 'none'; form-action 'self'; base-uri 'self'";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used for rate limiting.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Deny mutating requests beyond the configured per-client budget.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let trust = state.config.snapshot().rate_limit.trust_forwarded_for;
    let client = client_identity(request.headers(), peer, trust);

    if state.limiter.allow(&client) {
        return next.run(request).await;
    }

    warn!(%client, "rate limit exceeded");
    let retry_after = state.limiter.window().as_secs().max(1);
    let mut response = AppError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "rate_limited",
        format!(
            "rate limit exceeded: at most {} requests per {}s",
            state.limiter.max_requests(),
            retry_after
        ),
    )
    .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

/// Periodically drop idle identities from `limiter`.
///
/// The task sleeps one window between sweeps and ends once the limiter
/// itself has been dropped.
pub fn spawn_sweeper(limiter: &Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    let weak: Weak<RateLimiter> = Arc::downgrade(limiter);
    let period = limiter.window();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            let removed = limiter.sweep();
            if removed > 0 {
                debug!(removed, remaining = limiter.tracked_clients(), "swept rate limiter");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn forwarded(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(FORWARDED_FOR, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_identity_prefers_first_forwarded_entry() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let h = forwarded("203.0.113.7, 10.0.0.1");
        assert_eq!(client_identity(&h, Some(peer), true), "203.0.113.7");
    }

    #[test]
    fn test_identity_ignores_forwarded_when_untrusted() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let h = forwarded("203.0.113.7");
        assert_eq!(client_identity(&h, Some(peer), false), "10.0.0.9");
    }

    #[test]
    fn test_identity_falls_back_to_peer_then_unknown() {
        let peer: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(client_identity(&HeaderMap::new(), Some(peer), true), "::1");
        assert_eq!(client_identity(&forwarded(" "), None, true), "unknown");
    }

    #[tokio::test]
    async fn test_sweeper_forgets_idle_clients_and_stops_with_limiter() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(20), 5));
        limiter.allow("transient");
        let handle = spawn_sweeper(&limiter);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        drop(limiter);
        let finished = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
