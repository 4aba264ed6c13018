//! Anthropic-native adapter for the hosted Claude API.
//!
//! Implements the Messages API, including streaming and the Anthropic
//! message structure where system messages go in a separate top-level
//! `system` field. Model aliases are expanded through [`crate::models`], and
//! a request for a model the API does not know is retried once with the
//! default model.

use crate::models::{default_claude_model, resolve_model_name, supported_claude_models};
use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider,
};
use crate::util::{from_reqwest, resolve_api_key, status_error, token_count};
use ed_domain::capability::LlmCapabilities;
use ed_domain::config::ProviderConfig;
use ed_domain::error::{Error, Result};
use ed_domain::message::Role;
use ed_domain::stream::{BoxStream, StreamEvent, Usage};
use ed_domain::trace::TraceEvent;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from the deserialized provider config.
    ///
    /// Fails with [`Error::Auth`] when no API key can be resolved.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.id, &cfg.auth)?;
        let default_model = default_claude_model(cfg.default_model.as_deref());

        let capabilities = LlmCapabilities {
            supports_streaming: true,
            supports_embeddings: false,
            context_window_tokens: Some(200_000),
            max_output_tokens: Some(8_192),
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        tracing::info!(
            provider = %cfg.id,
            default_model = %default_model,
            "anthropic provider initialized"
        );

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            capabilities,
            client,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Send the request body and return the raw successful response.
    ///
    /// A 404 carrying `not_found_error` becomes [`Error::ModelNotFound`] so
    /// the caller can retry with the default model.
    async fn post_messages(&self, body: &Value, model: &str) -> Result<reqwest::Response> {
        let resp = self
            .authed_post(&self.messages_url())
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.map_err(from_reqwest)?;
        if status == reqwest::StatusCode::NOT_FOUND || text.contains("not_found_error") {
            return Err(Error::ModelNotFound {
                provider: self.id.clone(),
                model: model.to_string(),
            });
        }
        Err(status_error(&self.id, status, &text))
    }

    async fn chat_with_model(&self, req: &ChatRequest, model: &str) -> Result<ChatResponse> {
        let body = build_messages_body(req, model, false);
        tracing::debug!(provider = %self.id, model = %model, "anthropic chat request");

        let resp = self.post_messages(&body, model).await?;
        let resp_json: Value = resp.json().await.map_err(from_reqwest)?;
        parse_anthropic_response(&resp_json)
    }

    async fn stream_with_model(
        &self,
        req: &ChatRequest,
        model: &str,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = build_messages_body(req, model, true);
        tracing::debug!(provider = %self.id, model = %model, "anthropic stream request");

        let resp = self.post_messages(&body, model).await?;
        let mut state = StreamState::default();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    /// Whether a failed request deserves a second attempt on the default
    /// model: only when the caller explicitly asked for a different one.
    fn should_retry_with_default(&self, err: &Error, req: &ChatRequest, model: &str) -> bool {
        matches!(err, Error::ModelNotFound { .. })
            && req.model.is_some()
            && model != self.default_model
    }

    fn record_model_fallback(&self, from_model: &str) {
        tracing::warn!(
            provider = %self.id,
            model = %from_model,
            fallback = %self.default_model,
            "model not found, retrying with the default model"
        );
        TraceEvent::ModelFallback {
            provider: self.id.clone(),
            from_model: from_model.to_string(),
            to_model: self.default_model.clone(),
        }
        .emit();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_messages_body(req: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            Role::User | Role::Assistant => api_messages.push(serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })),
        }
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": api_messages,
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": stream,
    });

    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::json!(temp);
    }

    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(body: &Value) -> Result<ChatResponse> {
    let blocks = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Provider {
            provider: "anthropic".into(),
            message: "no content in response".into(),
        })?;

    let content: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let finish_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(normalize_stop_reason);

    let usage = body.get("usage").and_then(parse_anthropic_usage);

    Ok(ChatResponse {
        content,
        usage,
        model,
        finish_reason,
    })
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = token_count(v.get("input_tokens")?.as_u64()?);
    let output = token_count(v.get("output_tokens").and_then(|o| o.as_u64()).unwrap_or(0));
    Some(Usage::new(input, output))
}

fn normalize_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Usage is split across `message_start` (input) and `message_delta`
/// (output), so it is carried between payloads.
#[derive(Default)]
struct StreamState {
    usage: Option<Usage>,
    done_emitted: bool,
}

/// Parse a single Anthropic SSE data payload into zero or more events.
fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let mut events = Vec::new();
    match v.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "message_start" => {
            state.usage = v
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(parse_anthropic_usage);
        }

        "content_block_delta" => {
            let delta = v.get("delta");
            let is_text = delta.and_then(|d| d.get("type")).and_then(|t| t.as_str())
                == Some("text_delta");
            if is_text {
                if let Some(text) = delta.and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        events.push(Ok(StreamEvent::Token {
                            text: text.to_string(),
                        }));
                    }
                }
            }
        }

        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|o| o.as_u64())
            {
                let prompt = state.usage.map(|u| u.prompt_tokens).unwrap_or(0);
                state.usage = Some(Usage::new(prompt, token_count(output)));
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|s| s.as_str())
                .map(normalize_stop_reason);
            if stop_reason.is_some() {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    finish_reason: stop_reason,
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    finish_reason: Some("stop".into()),
                }));
            }
        }

        "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(StreamEvent::Error {
                message: message.to_string(),
            }));
        }

        // ping, content_block_start/stop, unknown types.
        _ => {}
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = resolve_model_name(req.model.as_deref(), &self.default_model);

        match self.chat_with_model(req, &model).await {
            Err(e) if self.should_retry_with_default(&e, req, &model) => {
                self.record_model_fallback(&model);
                self.chat_with_model(req, &self.default_model).await
            }
            Err(e) => {
                tracing::error!(provider = %self.id, model = %model, error = %e, "anthropic chat failed");
                Err(e)
            }
            ok => ok,
        }
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = resolve_model_name(req.model.as_deref(), &self.default_model);

        match self.stream_with_model(req, &model).await {
            Err(e) if self.should_retry_with_default(&e, req, &model) => {
                self.record_model_fallback(&model);
                self.stream_with_model(req, &self.default_model).await
            }
            other => other,
        }
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        // The Messages API has no embeddings endpoint.
        Err(Error::Unsupported {
            provider: self.id.clone(),
            operation: "embeddings".into(),
        })
    }

    async fn supported_models(&self) -> Result<Vec<String>> {
        Ok(supported_claude_models())
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ed_domain::message::Message;

    #[test]
    fn system_messages_are_lifted_out() {
        let req = ChatRequest {
            messages: vec![
                Message::system("Tu es un éditeur."),
                Message::user("Relis ce chapitre."),
                Message::system("Réponds en français."),
                Message::assistant("D'accord."),
            ],
            temperature: Some(0.3),
            ..Default::default()
        };
        let body = build_messages_body(&req, "claude-3-haiku-20240307", false);

        assert_eq!(body["system"], "Tu es un éditeur.\n\nRéponds en français.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert!(body.get("temperature").is_some());
    }

    #[test]
    fn parses_text_blocks_and_usage() {
        let body = serde_json::json!({
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Le rythme "},
                {"type": "text", "text": "est soutenu."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 42, "output_tokens": 7}
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "Le rythme est soutenu.");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage, Some(Usage::new(42, 7)));
    }

    #[test]
    fn missing_content_is_an_error() {
        let body = serde_json::json!({"model": "x"});
        assert!(parse_anthropic_response(&body).is_err());
    }

    #[test]
    fn sse_sequence_yields_tokens_then_done() {
        let mut state = StreamState::default();
        let payloads = [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Bon"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"jour"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"},"usage":{"output_tokens":5}}"#,
            r#"{"type":"message_stop"}"#,
        ];
        let events: Vec<StreamEvent> = payloads
            .iter()
            .flat_map(|p| parse_anthropic_sse(p, &mut state))
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                StreamEvent::Token { text: "Bon".into() },
                StreamEvent::Token { text: "jour".into() },
                StreamEvent::Done {
                    usage: Some(Usage::new(10, 5)),
                    finish_reason: Some("length".into()),
                },
            ]
        );
    }

    #[test]
    fn sse_error_payload_surfaces_message() {
        let mut state = StreamState::default();
        let events = parse_anthropic_sse(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &mut state,
        );
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Error { message }) if message == "Overloaded"
        ));
    }

    #[test]
    fn from_config_requires_a_key() {
        let mut cfg = ProviderConfig::anthropic("claude");
        cfg.auth.env = Some("ED_TEST_ANTHROPIC_KEY_NEVER_SET".into());
        assert!(matches!(
            AnthropicProvider::from_config(&cfg),
            Err(Error::Auth(_))
        ));
    }
}
