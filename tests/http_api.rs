//! HTTP API behaviour, driven through the router without a socket.

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use fishki::config::{Config, ConfigHandle};
use fishki::server::{router, AppState};
use fishki_core::vcs::fake::FakeVcs;
use fishki_core::VcsError;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "dGVzdC10b2tlbg==";

fn app_with(root: Option<&Path>, max_requests: usize) -> (Router, Arc<FakeVcs>) {
    let mut config = Config::default();
    config.wiki.root = root.map(Path::to_path_buf);
    config.rate_limit.max_requests = max_requests;
    let vcs = Arc::new(FakeVcs::new());
    let state = AppState::new(ConfigHandle::new(config), vcs.clone());
    (router(state), vcs)
}

fn app(root: &Path) -> (Router, Arc<FakeVcs>) {
    app_with(Some(root), 1000)
}

/// A mutating JSON request carrying a matching CSRF cookie and header.
fn mutating(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("fishki_csrf_token={}", TOKEN))
        .header("x-csrf-token", TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());

    let response = app.oneshot(get("/api/load?filename=missing.md")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let headers = response.headers();
    assert!(headers[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .contains("frame-ancestors 'none'"));
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::REFERRER_POLICY], "strict-origin-when-cross-origin");
}

#[tokio::test]
async fn test_csrf_token_endpoint_sets_cookie() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());

    let response = app.oneshot(get("/api/csrf-token")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    let token = body["csrfToken"].as_str().unwrap();
    assert!(cookie.starts_with(&format!("fishki_csrf_token={};", token)));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
}

#[tokio::test]
async fn test_mutation_without_csrf_pair_is_forbidden() {
    let tmp = TempDir::new().unwrap();
    let (app, vcs) = app(tmp.path());
    let body = json!({"filename": "a.md", "content": "x"}).to_string();

    let missing_header = Request::builder()
        .method(Method::POST)
        .uri("/api/save")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("fishki_csrf_token={}", TOKEN))
        .body(Body::from(body.clone()))
        .unwrap();
    let response = app.clone().oneshot(missing_header).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "csrf_failed");

    let missing_cookie = Request::builder()
        .method(Method::POST)
        .uri("/api/save")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-csrf-token", TOKEN)
        .body(Body::from(body.clone()))
        .unwrap();
    let response = app.clone().oneshot(missing_cookie).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mismatched = Request::builder()
        .method(Method::POST)
        .uri("/api/save")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("fishki_csrf_token={}", TOKEN))
        .header("x-csrf-token", "something-else")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(mismatched).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(!tmp.path().join("a.md").exists());
    assert!(vcs.snapshot().commits.is_empty());
}

#[tokio::test]
async fn test_save_with_matching_csrf_pair() {
    let tmp = TempDir::new().unwrap();
    let (app, vcs) = app(tmp.path());

    let response = app
        .oneshot(mutating(
            Method::POST,
            "/api/save",
            json!({"filename": "notes/today.md", "content": "# Hi"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"status": "ok"}));
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("notes/today.md")).unwrap(),
        "# Hi"
    );
    assert_eq!(vcs.snapshot().commits.len(), 1);
}

#[tokio::test]
async fn test_save_reports_push_warning_in_body() {
    let tmp = TempDir::new().unwrap();
    let (app, vcs) = app(tmp.path());
    vcs.configure(|s| {
        s.has_remote = true;
        s.push_error = Some(VcsError::failed("push", "exit status: 1", "rejected"));
    });

    let response = app
        .oneshot(mutating(
            Method::POST,
            "/api/save",
            json!({"filename": "a.md", "content": "x"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["warning"], "push failed: exit status: 1");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/save")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("fishki_csrf_token={}", TOKEN))
        .header("x-csrf-token", TOKEN)
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_files_tree_shape() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("wiki");
    std::fs::create_dir_all(root.join("notes")).unwrap();
    std::fs::write(root.join("notes/a.md"), "a").unwrap();
    std::fs::write(root.join("index.md"), "i").unwrap();
    std::fs::write(root.join(".hidden.md"), "h").unwrap();
    let (app, _) = app(&root);

    let response = app.oneshot(get("/api/files")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"files": [{
            "name": "wiki",
            "type": "folder",
            "path": "",
            "children": [
                {"name": "notes", "type": "folder", "path": "notes", "children": [
                    {"name": "a.md", "type": "file", "path": "notes/a.md"}
                ]},
                {"name": "index.md", "type": "file", "path": "index.md"}
            ]
        }]})
    );
}

#[tokio::test]
async fn test_load_statuses() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("notes")).unwrap();
    std::fs::write(tmp.path().join("notes/a.md"), "alpha").unwrap();
    let (app, _) = app(tmp.path());

    let ok = app.clone().oneshot(get("/api/load?filename=notes/a.md")).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert!(ok.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(ok).await, b"alpha");

    let dir = app.clone().oneshot(get("/api/load?filename=notes")).await.unwrap();
    assert_eq!(dir.status(), StatusCode::BAD_REQUEST);

    let empty = app.clone().oneshot(get("/api/load")).await.unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let escape = app
        .oneshot(get("/api/load?filename=..%2F..%2Fetc%2Fpasswd"))
        .await
        .unwrap();
    assert_eq!(escape.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(escape).await["error"]["code"], "invalid_path");
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());

    let response = app
        .oneshot(mutating(Method::DELETE, "/api/delete", json!({"filename": "gone.md"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_unconfigured_root() {
    let (app, _) = app_with(None, 1000);

    let response = app.oneshot(get("/api/files")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_rate_limit_applies_to_mutations_only() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.md"), "a").unwrap();
    let (app, _) = app_with(Some(tmp.path()), 2);

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/api/load?filename=a.md")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let render = || mutating(Method::POST, "/api/render", json!({"markdown": "# x"}));
    assert_eq!(app.clone().oneshot(render()).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(render()).await.unwrap().status(), StatusCode::OK);

    let denied = app.clone().oneshot(render()).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.headers()[header::RETRY_AFTER], "60");
    assert_eq!(body_json(denied).await["error"]["code"], "rate_limited");

    let mut other_client = render();
    other_client
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
    assert_eq!(app.oneshot(other_client).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_render() {
    let tmp = TempDir::new().unwrap();
    let (app, _) = app(tmp.path());

    let response = app
        .clone()
        .oneshot(mutating(Method::POST, "/api/render", json!({"markdown": "# Hello"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("<h1>Hello</h1>"));

    let empty = app
        .oneshot(mutating(Method::POST, "/api/render", json!({"markdown": ""})))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_and_sync_endpoints() {
    let tmp = TempDir::new().unwrap();
    let (app, vcs) = app(tmp.path());

    let response = app.clone().oneshot(get("/api/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"branch": "main", "ahead": 0, "behind": 0, "modified": 0, "untracked": 0, "has_remote": false})
    );

    let pull = app
        .clone()
        .oneshot(mutating(Method::POST, "/api/pull", json!({})))
        .await
        .unwrap();
    assert_eq!(pull.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(pull).await["error"]["code"], "no_remote");

    vcs.configure(|s| s.has_remote = true);
    let push = app
        .oneshot(mutating(Method::POST, "/api/push", json!({})))
        .await
        .unwrap();
    assert_eq!(push.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_init_adopts_new_root() {
    let tmp = TempDir::new().unwrap();
    let (app, vcs) = app_with(None, 1000);
    let target = tmp.path().join("fresh");

    let response = app
        .clone()
        .oneshot(mutating(
            Method::POST,
            "/api/init",
            json!({"path": target.to_str().unwrap()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(target.is_dir());

    let files = app.oneshot(get("/api/files")).await.unwrap();
    assert_eq!(files.status(), StatusCode::OK);
    assert_eq!(body_json(files).await["files"][0]["name"], "fresh");
    assert!(vcs.snapshot().is_repository);
}
