//! LM Studio adapter against a local OpenAI-compatible stand-in.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ed_domain::config::ProviderConfig;
use ed_domain::message::Message;
use ed_domain::stream::StreamEvent;
use ed_providers::{ChatRequest, EmbeddingsRequest, LlmProvider, LmStudioProvider};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
    model_listings: Arc<AtomicUsize>,
}

async fn models(State(rec): State<Recorder>) -> Json<Value> {
    rec.model_listings.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "object": "list",
        "data": [{"id": "mistral-7b-instruct"}, {"id": "phi-3-mini"}]
    }))
}

async fn chat(State(rec): State<Recorder>, Json(body): Json<Value>) -> Response {
    rec.bodies.lock().push(body.clone());

    if body["stream"] == json!(true) {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Très \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"bien\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "model": body["model"],
        "choices": [{"message": {"role": "assistant", "content": "Très bien"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
    }))
    .into_response()
}

async fn embeddings(Json(body): Json<Value>) -> Response {
    if body["model"] == json!("broken-embedder") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
    let data: Vec<Value> = (0..n)
        .map(|i| json!({"index": i, "embedding": [0.5, -0.25, i as f64]}))
        .collect();
    Json(json!({"data": data})).into_response()
}

async fn spawn_server() -> (String, Recorder) {
    let rec = Recorder::default();
    let app = Router::new()
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat))
        .route("/v1/embeddings", post(embeddings))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), rec)
}

fn provider(base_url: &str) -> LmStudioProvider {
    let mut cfg = ProviderConfig::lm_studio("lmstudio");
    cfg.base_url = base_url.to_string();
    LmStudioProvider::from_config(&cfg).unwrap()
}

#[tokio::test]
async fn chat_uses_first_loaded_model_and_caches_listing() {
    let (base, rec) = spawn_server().await;
    let p = provider(&base);
    let req = ChatRequest {
        messages: vec![Message::user("Corrige ce paragraphe.")],
        temperature: Some(0.2),
        ..Default::default()
    };

    let first = p.chat(&req).await.unwrap();
    let _second = p.chat(&req).await.unwrap();

    assert_eq!(first.content, "Très bien");
    assert_eq!(first.model, "mistral-7b-instruct");
    assert_eq!(first.usage.unwrap().total_tokens, 11);
    assert_eq!(rec.model_listings.load(Ordering::SeqCst), 1);

    let sent = rec.bodies.lock()[0].clone();
    assert_eq!(sent["model"], "mistral-7b-instruct");
    assert!((sent["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn requested_model_skips_discovery() {
    let (base, rec) = spawn_server().await;
    let p = provider(&base);
    let req = ChatRequest {
        messages: vec![Message::user("Salut")],
        model: Some("phi-3-mini".into()),
        ..Default::default()
    };
    p.chat(&req).await.unwrap();
    assert_eq!(rec.model_listings.load(Ordering::SeqCst), 0);
    assert_eq!(rec.bodies.lock()[0]["model"], "phi-3-mini");
}

#[tokio::test]
async fn supported_models_lists_the_server_models() {
    let (base, _rec) = spawn_server().await;
    let models = provider(&base).supported_models().await.unwrap();
    assert_eq!(models, vec!["mistral-7b-instruct", "phi-3-mini"]);
}

#[tokio::test]
async fn unreachable_server_falls_back_to_static_models() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let p = provider(&format!("http://{addr}/v1"));
    let models = p.supported_models().await.unwrap();
    assert_eq!(models[0], "qwen2.5-7b-instruct-1m");
    assert_eq!(models.len(), 3);

    let err = p
        .chat(&ChatRequest::new(vec![Message::user("x")]))
        .await
        .unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn stream_collects_text_and_single_done() {
    let (base, _rec) = spawn_server().await;
    let p = provider(&base);
    let events: Vec<StreamEvent> = p
        .chat_stream(&ChatRequest {
            messages: vec![Message::user("Salut")],
            model: Some("phi-3-mini".into()),
            ..Default::default()
        })
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Très bien");

    let dones = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Done { .. }))
        .count();
    assert_eq!(dones, 1);
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
}

#[tokio::test]
async fn embeddings_round_trip_and_errors_propagate() {
    let (base, _rec) = spawn_server().await;
    let p = provider(&base);

    let ok = p
        .embeddings(EmbeddingsRequest {
            input: vec!["un".into(), "deux".into()],
            model: None,
        })
        .await
        .unwrap();
    assert_eq!(ok.embeddings.len(), 2);
    assert_eq!(ok.embeddings[1], vec![0.5, -0.25, 1.0]);

    let err = p
        .embeddings(EmbeddingsRequest {
            input: vec!["un".into()],
            model: Some("broken-embedder".into()),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
}

/// One-shot HTTP stand-in that writes the SSE body in separate TCP writes,
/// pausing between them. `declared_len` lets a test promise more bytes than
/// it sends, so the connection closes mid-body.
async fn spawn_raw_sse(parts: Vec<Vec<u8>>, declared_len: usize) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {declared_len}\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for part in parts {
            socket.write_all(&part).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    });
    format!("http://{addr}/v1")
}

async fn collect_stream(p: &LmStudioProvider) -> Vec<ed_domain::error::Result<StreamEvent>> {
    p.chat_stream(&ChatRequest {
        messages: vec![Message::user("Raconte l'été.")],
        model: Some("phi-3-mini".into()),
        ..Default::default()
    })
    .await
    .unwrap()
    .collect()
    .await
}

#[tokio::test]
async fn stream_keeps_accents_split_across_chunks() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"été\"}}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes()
    .to_vec();
    let cut = body.iter().position(|b| *b == 0xC3).unwrap() + 1;
    let len = body.len();
    let base = spawn_raw_sse(vec![body[..cut].to_vec(), body[cut..].to_vec()], len).await;

    let events = collect_stream(&provider(&base)).await;
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            Ok(StreamEvent::Token { text }) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "été");
    assert!(matches!(events.last(), Some(Ok(StreamEvent::Done { .. }))));
}

#[tokio::test]
async fn dropped_connection_ends_with_error_not_done() {
    let first = b"data: {\"choices\":[{\"delta\":{\"content\":\"Il \"}}]}\n\n".to_vec();
    // Promise far more than is sent, then close the socket.
    let base = spawn_raw_sse(vec![first], 4096).await;

    let events = collect_stream(&provider(&base)).await;
    assert!(matches!(
        events.first(),
        Some(Ok(StreamEvent::Token { text })) if text == "Il "
    ));
    assert!(matches!(events.last(), Some(Err(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Ok(StreamEvent::Done { .. }))));
}
