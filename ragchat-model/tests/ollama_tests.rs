//! Ollama client behavior against a local stand-in server.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use futures::StreamExt;
use ragchat_model::{GenerationOptions, ModelError, OllamaClient, OllamaConfig, TextGenerator};
use serde_json::{Value, json};

async fn spawn_server(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

fn client(base: &str) -> OllamaClient {
    OllamaClient::new(OllamaConfig::new(base, "llama3").with_request_timeout(Duration::from_secs(5)))
        .expect("client")
}

/// Streams NDJSON split at awkward byte boundaries, with one malformed line.
async fn streaming_generate(axum::Json(request): axum::Json<Value>) -> impl IntoResponse {
    assert_eq!(request["stream"], json!(true));
    let parts: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"{\"response\":\"Hel\",\"done\":false}\n{\"resp")),
        Ok(Bytes::from_static(b"onse\":\"lo\",\"done\":false}\nnot json at all\n")),
        Ok(Bytes::from_static(b"{\"response\":\" world\",\"done\":false}\n")),
        Ok(Bytes::from_static(b"{\"response\":\"\",\"done\":true}\n")),
        Ok(Bytes::from_static(b"{\"response\":\"after done\",\"done\":false}\n")),
    ];
    Body::from_stream(futures::stream::iter(parts))
}

async fn blocking_generate(axum::Json(request): axum::Json<Value>) -> impl IntoResponse {
    assert_eq!(request["stream"], json!(false));
    assert_eq!(request["model"], json!("llama3"));
    let top_k = request["options"]["top_k"].as_u64().unwrap_or_default();
    axum::Json(json!({ "response": format!("  top_k was {top_k}\n"), "done": true }))
}

#[tokio::test]
async fn generate_returns_trimmed_response_and_sends_options() {
    let (base, handle) = spawn_server(Router::new().route("/api/generate", post(blocking_generate))).await;

    let answer = client(&base).generate("hi", &GenerationOptions::default()).await.unwrap();
    assert_eq!(answer, "top_k was 40");

    handle.abort();
}

#[tokio::test]
async fn stream_reassembles_lines_skips_garbage_and_stops_at_done() {
    let (base, handle) = spawn_server(Router::new().route("/api/generate", post(streaming_generate))).await;

    let stream = client(&base).stream_generate("hi", &GenerationOptions::default()).await.unwrap();
    let increments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(increments, vec!["Hel", "lo", " world"]);

    handle.abort();
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::NOT_FOUND, "model 'llama3' not found") }),
    );
    let (base, handle) = spawn_server(app).await;

    let err = client(&base).generate("hi", &GenerationOptions::default()).await.unwrap_err();
    match &err {
        ModelError::Status { status, body } => {
            assert_eq!(*status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.user_message().starts_with("Sorry"));

    let err = client(&base).stream_generate("hi", &GenerationOptions::default()).await.err().unwrap();
    assert!(matches!(err, ModelError::Status { status: 404, .. }));

    handle.abort();
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base).generate("hi", &GenerationOptions::default()).await.unwrap_err();
    assert!(matches!(err, ModelError::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn check_connection_reports_model_presence() {
    let app = Router::new().route(
        "/api/tags",
        get(|| async {
            axum::Json(json!({ "models": [{ "name": "llama3:latest" }, { "name": "mistral:7b" }] }))
        }),
    );
    let (base, handle) = spawn_server(app).await;

    let present = client(&base);
    assert_eq!(present.list_models().await.unwrap(), vec!["llama3:latest", "mistral:7b"]);
    assert!(present.check_connection().await.unwrap());

    let missing = OllamaClient::new(OllamaConfig::new(&base, "phi3")).unwrap();
    assert!(!missing.check_connection().await.unwrap());

    handle.abort();
}
