//! Anthropic adapter against a local stand-in for the Messages API.
//!
//! The server records every request body so tests can check what went on
//! the wire, including the retry with the default model.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ed_domain::config::{AuthConfig, ProviderConfig};
use ed_domain::error::Error;
use ed_domain::message::Message;
use ed_domain::stream::StreamEvent;
use ed_providers::{AnthropicProvider, ChatRequest, EmbeddingsRequest, LlmProvider};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

const RETIRED_MODEL: &str = "claude-3-opus-20240229";

#[derive(Clone, Default)]
struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn messages(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    rec.bodies.lock().push(body.clone());

    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("sk-ant-test") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"type": "error", "error": {"type": "authentication_error", "message": "bad key"}})),
        )
            .into_response();
    }

    let model = body["model"].as_str().unwrap_or_default().to_string();
    if model == RETIRED_MODEL {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"type": "error", "error": {"type": "not_found_error", "message": format!("model: {model}")}})),
        )
            .into_response();
    }

    if body["stream"] == json!(true) {
        let sse = [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":12,"output_tokens":1}}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Chapitre "}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"relu."}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":4}}"#,
            r#"{"type":"message_stop"}"#,
        ]
        .iter()
        .map(|d| format!("event: x\ndata: {d}\n\n"))
        .collect::<String>();
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "model": model,
        "content": [{"type": "text", "text": format!("answered by {model}")}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 20, "output_tokens": 5}
    }))
    .into_response()
}

async fn spawn_server() -> (String, Recorder) {
    let rec = Recorder::default();
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rec)
}

fn provider(base_url: &str, key: &str) -> AnthropicProvider {
    let mut cfg = ProviderConfig::anthropic("claude");
    cfg.base_url = base_url.to_string();
    cfg.default_model = Some("haiku".into());
    cfg.auth = AuthConfig {
        key: Some(key.into()),
        ..Default::default()
    };
    AnthropicProvider::from_config(&cfg).unwrap()
}

fn skip_if_default_overridden() -> bool {
    std::env::var("CLAUDE_DEFAULT_MODEL").is_ok()
}

#[tokio::test]
async fn chat_sends_system_separately_and_reads_usage() {
    if skip_if_default_overridden() {
        return;
    }
    let (base, rec) = spawn_server().await;
    let p = provider(&base, "sk-ant-test");

    let req = ChatRequest {
        messages: vec![Message::system("Sois bref."), Message::user("Résume.")],
        max_tokens: Some(256),
        ..Default::default()
    };
    let resp = p.chat(&req).await.unwrap();

    assert_eq!(resp.content, "answered by claude-3-haiku-20240307");
    assert_eq!(resp.usage.unwrap().total_tokens, 25);

    let sent = rec.bodies.lock()[0].clone();
    assert_eq!(sent["system"], "Sois bref.");
    assert_eq!(sent["max_tokens"], 256);
    assert_eq!(sent["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_model_retries_once_with_default() {
    if skip_if_default_overridden() {
        return;
    }
    let (base, rec) = spawn_server().await;
    let p = provider(&base, "sk-ant-test");

    let req = ChatRequest {
        messages: vec![Message::user("Bonjour")],
        model: Some("opus".into()),
        ..Default::default()
    };
    let resp = p.chat(&req).await.unwrap();
    assert_eq!(resp.model, "claude-3-haiku-20240307");

    let models: Vec<String> = rec
        .bodies
        .lock()
        .iter()
        .map(|b| b["model"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(models, vec![RETIRED_MODEL, "claude-3-haiku-20240307"]);
}

#[tokio::test]
async fn bad_key_is_a_provider_error_without_retry() {
    let (base, rec) = spawn_server().await;
    let p = provider(&base, "wrong");

    let err = p
        .chat(&ChatRequest::new(vec![Message::user("Bonjour")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));
    assert!(err.to_string().contains("HTTP 401"));
    assert!(!err.is_retriable());
    assert_eq!(rec.bodies.lock().len(), 1);
}

#[tokio::test]
async fn stream_yields_tokens_then_done_with_usage() {
    let (base, _rec) = spawn_server().await;
    let p = provider(&base, "sk-ant-test");

    let mut stream = p
        .chat_stream(&ChatRequest::new(vec![Message::user("Relis")]))
        .await
        .unwrap();

    let mut text = String::new();
    let mut done = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Token { text: t } => text.push_str(&t),
            StreamEvent::Done { usage, finish_reason } => done = Some((usage, finish_reason)),
            StreamEvent::Error { message } => panic!("unexpected error event: {message}"),
        }
    }

    assert_eq!(text, "Chapitre relu.");
    let (usage, finish) = done.expect("stream must end with Done");
    assert_eq!(usage.unwrap().completion_tokens, 4);
    assert_eq!(finish.as_deref(), Some("stop"));
}

#[tokio::test]
async fn embeddings_are_unsupported() {
    let (base, _rec) = spawn_server().await;
    let p = provider(&base, "sk-ant-test");
    let err = p
        .embeddings(EmbeddingsRequest {
            input: vec!["texte".into()],
            model: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
}
