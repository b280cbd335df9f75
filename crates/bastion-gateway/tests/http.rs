//! HTTP surface exercised through the router with a fake connector

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use bastion_core::config::GatewayConfig;
use bastion_core::{AccessTokenCodec, CredentialBundle, RemoteSession};
use bastion_gateway::server::router;
use bastion_gateway::{GatewayState, SessionRegistry};
use bastion_protocol::TerminalSize;
use tokio_util::sync::CancellationToken;

use common::{FakeConnection, FakeConnector};

struct Harness {
    app: Router,
    connection: Arc<FakeConnection>,
    connector: Arc<FakeConnector>,
    codec: AccessTokenCodec,
    sessions: Arc<SessionRegistry>,
}

fn harness() -> Harness {
    let key = AccessTokenCodec::generate_key();
    let connection = FakeConnection::new();
    let connector = FakeConnector::new(connection.clone());
    let state = GatewayState::new(
        GatewayConfig::default(),
        connector.clone(),
        Some(AccessTokenCodec::new(&key).unwrap()),
    );
    let sessions = Arc::clone(&state.sessions);
    Harness {
        app: router(Arc::new(state)),
        sessions,
        connection,
        connector,
        codec: AccessTokenCodec::new(&key).unwrap(),
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"status": "ok", "sessions": 0, "active": []}));
}

#[tokio::test]
async fn test_health_lists_live_sessions() {
    let h = harness();
    let credentials = CredentialBundle::new("h1", "alice").with_password("pw");
    let session = Arc::new(RemoteSession::new(&credentials, TerminalSize::new(24, 80)));
    let id = session.id;
    let registration = h.sessions.register(session, CancellationToken::new());

    let (status, _, body) = get(&h.app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["active"][0]["id"], id.to_string());
    assert_eq!(body["active"][0]["user"], "alice");
    assert_eq!(body["active"][0]["host"], "h1");
    assert_eq!(body["active"][0]["state"], "connecting");
    assert!(!body.to_string().contains("pw"));

    drop(registration);
    let (_, _, body) = get(&h.app, "/healthz").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_download_outside_allow_list_is_forbidden_before_connecting() {
    let h = harness();
    let (status, _, body) = get(
        &h.app,
        "/download?host=h1&user=alice&password=pw&path=/etc/passwd",
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(String::from_utf8_lossy(&body).contains("Access denied"));
    assert_eq!(h.connector.attempts(), 0);
}

#[tokio::test]
async fn test_download_missing_parameters() {
    let h = harness();
    let (status, _, _) = get(&h.app, "/download?host=h1&user=alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&h.app, "/download?path=/tmp/a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.connector.attempts(), 0);
}

#[tokio::test]
async fn test_download_streams_attachment() {
    let h = harness();
    h.connection.put_file("/home/alice/report.csv", b"a,b\n1,2\n");

    let (status, headers, body) = get(
        &h.app,
        "/download?host=h1&user=alice&password=pw&path=/home/alice/report.csv",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.csv\""
    );
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(body, b"a,b\n1,2\n");
    assert_eq!(h.connection.close_count(), 1);
}

#[tokio::test]
async fn test_download_remote_failure_is_server_error() {
    let h = harness();
    let (status, _, body) = get(
        &h.app,
        "/download?host=h1&user=alice&password=pw&path=/tmp/nope",
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8_lossy(&body).starts_with("Download failed"));
}

#[tokio::test]
async fn test_download_with_access_token() {
    let h = harness();
    h.connection.put_file("/tmp/x", b"x");
    let token = h
        .codec
        .encode(&CredentialBundle::new("h1", "alice").with_password("pw"));

    let (status, _, body) = get(&h.app, &format!("/download?access={}&path=/tmp/x", token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"x");
    let used = h.connector.last_credentials.lock().unwrap().clone().unwrap();
    assert_eq!(used.user, "alice");
    assert_eq!(used.host, "h1");
}

#[tokio::test]
async fn test_access_summary() {
    let h = harness();
    let token = h
        .codec
        .encode(&CredentialBundle::new("h1", "alice").with_private_key(b"KEY".to_vec()));

    let (status, _, body) = get(&h.app, &format!("/api/access?access={}", token)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body,
        json!({"user": "alice", "host": "h1", "hasPrivateKey": true})
    );

    let (status, _, body) = get(&h.app, "/api/access?access=garbage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"error": "Invalid access token"}));
}

fn multipart_body(boundary: &str, fields: &[(&str, Option<&str>, &str)]) -> String {
    let mut body = String::new();
    for (name, filename, value) in fields {
        body.push_str(&format!("--{}\r\n", boundary));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                name, filename
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

async fn post_upload(app: &Router, fields: &[(&str, Option<&str>, &str)]) -> Value {
    let boundary = "bastion-test-boundary";
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart_body(boundary, fields)))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_upload_streams_file_part() {
    let h = harness();
    let body = post_upload(
        &h.app,
        &[
            ("host", None, "h1"),
            ("user", None, "alice"),
            ("password", None, "pw"),
            ("file", Some("notes.txt"), "hello"),
        ],
    )
    .await;

    assert_eq!(body, json!({"success": true, "path": "/tmp/notes.txt"}));
    assert_eq!(h.connection.file("/tmp/notes.txt").unwrap(), b"hello");
    assert_eq!(h.connection.close_count(), 1);
}

#[tokio::test]
async fn test_upload_requires_credentials_before_file() {
    let h = harness();
    let body = post_upload(
        &h.app,
        &[
            ("file", Some("notes.txt"), "hello"),
            ("host", None, "h1"),
            ("user", None, "alice"),
        ],
    )
    .await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Missing host or user"));
    assert_eq!(h.connector.attempts(), 0);
}

#[tokio::test]
async fn test_upload_rejects_invalid_name_before_connecting() {
    let h = harness();
    let body = post_upload(
        &h.app,
        &[
            ("host", None, "h1"),
            ("user", None, "alice"),
            ("file", Some(".."), "x"),
        ],
    )
    .await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(h.connector.attempts(), 0);
}
