//! Integration test: run a mock chat endpoint on a loopback port and drive the real HTTP
//! backend (and the controller on top of it) against it.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chatbot::controller::ChatController;
use chatbot::endpoint::{
    ChatBackend, ChatRequest, ExchangeError, HttpChatBackend, SERVER_ERROR_TEXT, TIMEOUT_TEXT,
    UNREACHABLE_TEXT,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Seen = Arc<Mutex<Vec<Value>>>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn backend(base_url: &str, timeout: Duration) -> HttpChatBackend {
    HttpChatBackend::new(base_url, timeout).expect("build client")
}

fn request(input: &str) -> ChatRequest {
    ChatRequest {
        input: input.to_string(),
        session_id: "AbC123xYz9".to_string(),
    }
}

async fn echo(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    let input = body["input"].as_str().unwrap_or_default().to_string();
    seen.lock().unwrap().push(body);
    Json(json!({ "output": format!("echo: {}", input) }))
}

fn echo_app(seen: Seen) -> Router {
    Router::new().route("/chat", post(echo)).with_state(seen)
}

#[tokio::test]
async fn success_returns_output_and_sends_session_id() {
    let seen = Seen::default();
    let base = serve(echo_app(seen.clone())).await;

    let reply = backend(&base, Duration::from_secs(5))
        .chat(&request("Hello"))
        .await
        .expect("chat reply");

    assert_eq!(reply.output, "echo: Hello");
    assert!(reply.file_info.is_none());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], json!({ "input": "Hello", "session_id": "AbC123xYz9" }));
}

#[tokio::test]
async fn server_error_with_error_field_surfaces_it() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Model overloaded" })),
            )
        }),
    );
    let base = serve(app).await;

    let err = backend(&base, Duration::from_secs(5))
        .chat(&request("Hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Status { status: 500, .. }));
    assert_eq!(err.fallback_text(), "Model overloaded");
}

#[tokio::test]
async fn server_error_without_error_field_is_generic() {
    let app = Router::new().route(
        "/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = serve(app).await;

    let err = backend(&base, Duration::from_secs(5))
        .chat(&request("Hello"))
        .await
        .unwrap_err();

    assert_eq!(err.fallback_text(), SERVER_ERROR_TEXT);
}

#[tokio::test]
async fn bad_request_error_field_is_shown() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No input data provided" })),
            )
        }),
    );
    let base = serve(app).await;

    let err = backend(&base, Duration::from_secs(5))
        .chat(&request(""))
        .await
        .unwrap_err();

    assert_eq!(err.fallback_text(), "No input data provided");
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "output": "too late" }))
        }),
    );
    let base = serve(app).await;

    let err = backend(&base, Duration::from_millis(200))
        .chat(&request("Hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Timeout));
    assert_eq!(err.fallback_text(), TIMEOUT_TEXT);
}

#[tokio::test]
async fn unreachable_endpoint_is_unreachable_text() {
    let err = backend(&closed_port_url(), Duration::from_secs(2))
        .chat(&request("Hello"))
        .await
        .unwrap_err();
    assert_eq!(err.fallback_text(), UNREACHABLE_TEXT);
}

#[tokio::test]
async fn malformed_success_body_is_unreachable_text() {
    let app = Router::new().route("/chat", post(|| async { Json(json!({ "answer": "?" })) }));
    let base = serve(app).await;

    let err = backend(&base, Duration::from_secs(5))
        .chat(&request("Hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Malformed(_)));
    assert_eq!(err.fallback_text(), UNREACHABLE_TEXT);
}

async fn upload(State(seen): State<Seen>, mut form: Multipart) -> Json<Value> {
    let mut fields = serde_json::Map::new();
    let mut filename = String::new();
    while let Some(field) = form.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name() {
            filename = file_name.to_string();
        }
        let data = field.bytes().await.expect("field bytes");
        fields.insert(name, Value::String(String::from_utf8_lossy(&data).into_owned()));
    }
    seen.lock().unwrap().push(Value::Object(fields));
    Json(json!({
        "output": "File received",
        "file_info": { "filename": filename, "content_type": "text/plain", "processed": true }
    }))
}

fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chatbot-upload-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write temp file");
    path
}

#[tokio::test]
async fn file_upload_is_multipart() {
    let seen = Seen::default();
    let app = Router::new().route("/chat", post(upload)).with_state(seen.clone());
    let base = serve(app).await;
    let path = temp_file("notes.txt", b"meeting at noon");

    let reply = backend(&base, Duration::from_secs(5))
        .chat_with_file(&request("summarize"), &path)
        .await
        .expect("upload reply");

    assert_eq!(reply.output, "File received");
    let info = reply.file_info.expect("file_info");
    assert_eq!(info.filename, "notes.txt");
    assert!(info.processed);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0]["input"], "summarize");
    assert_eq!(seen[0]["session_id"], "AbC123xYz9");
    assert_eq!(seen[0]["file"], "meeting at noon");

    let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
}

#[tokio::test]
async fn missing_upload_file_fails_without_request() {
    let seen = Seen::default();
    let app = Router::new().route("/chat", post(upload)).with_state(seen.clone());
    let base = serve(app).await;

    let err = backend(&base, Duration::from_secs(5))
        .chat_with_file(&request(""), std::path::Path::new("/definitely/not/here.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Attachment { .. }));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn controller_round_trip_over_http() {
    let seen = Seen::default();
    let base = serve(echo_app(seen.clone())).await;
    let backend = Arc::new(backend(&base, Duration::from_secs(5)));
    let (handle, _task) = ChatController::new(backend)
        .with_receive_timeout(Duration::from_secs(5))
        .spawn();

    handle.submit("Hello", false).await.expect("submit");
    let mut snapshot = handle.snapshot().await.expect("snapshot");
    for _ in 0..200 {
        if !snapshot.pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        snapshot = handle.snapshot().await.expect("snapshot");
    }

    assert!(!snapshot.pending, "reply did not arrive within 2s");
    let texts: Vec<_> = snapshot
        .messages
        .iter()
        .map(|m| m.text.clone().unwrap_or_default())
        .collect();
    assert_eq!(texts[1..], ["Hello".to_string(), "echo: Hello".to_string()]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0]["session_id"], snapshot.session_id.as_str());

    drop(seen);
    handle.shutdown().await.expect("shutdown");
}
