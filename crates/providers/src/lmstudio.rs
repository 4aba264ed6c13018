//! LM Studio adapter.
//!
//! LM Studio exposes an OpenAI-compatible server (`/v1/chat/completions`,
//! `/v1/embeddings`, `/v1/models`) for whatever models are loaded locally.
//! No key is needed unless the server was started behind a proxy that asks
//! for one. With `simulate = true` every call is answered locally.

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider,
};
use crate::util::{from_reqwest, head_chars, optional_api_key, status_error, token_count};
use ed_domain::capability::LlmCapabilities;
use ed_domain::config::ProviderConfig;
use ed_domain::error::{Error, Result};
use ed_domain::message::last_user_content;
use ed_domain::stream::{BoxStream, StreamEvent, Usage};
use parking_lot::Mutex;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Listed when the server cannot be reached.
pub const FALLBACK_MODELS: &[&str] = &[
    "qwen2.5-7b-instruct-1m",
    "llama3-8b-instruct",
    "gemma-7b-instruct",
];

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-nomic-embed-text-v1.5";

/// Dimension of the vectors returned in simulate mode.
pub const SIMULATED_EMBEDDING_DIM: usize = 384;

const TOP_P: f32 = 0.9;
const SIMULATED_CHUNK_CHARS: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LmStudioProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: Option<String>,
    embedding_model: String,
    simulate: bool,
    /// Ids reported by `/models`, fetched on first use.
    discovered_models: Mutex<Option<Vec<String>>>,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl LmStudioProvider {
    /// Build from config. An auth section is optional; when present it must
    /// resolve to a key.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = optional_api_key(&cfg.id, &cfg.auth)?;

        let capabilities = LlmCapabilities {
            supports_streaming: true,
            supports_embeddings: true,
            context_window_tokens: None,
            max_output_tokens: None,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        if cfg.simulate {
            tracing::info!(provider = %cfg.id, "LM Studio provider running in simulate mode");
        }

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.default_model.clone(),
            embedding_model: cfg
                .embedding_model
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            simulate: cfg.simulate,
            discovered_models: Mutex::new(None),
            capabilities,
            client,
        })
    }

    pub fn is_simulated(&self) -> bool {
        self.simulate
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.post(url))
            .header("Content-Type", "application/json")
    }

    /// Query `/models` for the ids of the loaded models.
    async fn fetch_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let resp = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(status_error(&self.id, status, &text));
        }

        let body: Value = serde_json::from_str(&text)?;
        let ids = body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    /// Cached model list; only a successful, non-empty answer is cached.
    async fn loaded_models(&self) -> Option<Vec<String>> {
        if let Some(cached) = self.discovered_models.lock().clone() {
            return Some(cached);
        }
        match self.fetch_models().await {
            Ok(ids) if !ids.is_empty() => {
                *self.discovered_models.lock() = Some(ids.clone());
                Some(ids)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(provider = %self.id, error = %e, "could not list LM Studio models");
                None
            }
        }
    }

    /// Request model, then configured default, then the first loaded model,
    /// then the first static fallback.
    async fn effective_model(&self, req: &ChatRequest) -> String {
        if let Some(model) = req.model.as_ref().filter(|m| !m.trim().is_empty()) {
            return model.clone();
        }
        if let Some(model) = &self.default_model {
            return model.clone();
        }
        if let Some(first) = self.loaded_models().await.and_then(|m| m.into_iter().next()) {
            return first;
        }
        FALLBACK_MODELS[0].to_string()
    }

    async fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req).await,
            "messages": messages,
            "stream": stream,
            "top_p": TOP_P,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .authed_post(url)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.map_err(from_reqwest)?;
        Err(status_error(&self.id, status, &text))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Simulate mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn simulated_reply(req: &ChatRequest) -> String {
    let prompt = last_user_content(&req.messages).unwrap_or("");
    format!(
        "[simulated LM Studio response] Reply to: {}...",
        head_chars(prompt, 50)
    )
}

fn simulated_chunks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(SIMULATED_CHUNK_CHARS)
        .map(|c| c.iter().collect())
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatResponse {
        content,
        usage: body.get("usage").and_then(parse_openai_usage),
        model,
        finish_reason,
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    let prompt = token_count(v.get("prompt_tokens")?.as_u64()?);
    let completion = token_count(v.get("completion_tokens")?.as_u64()?);
    Some(Usage::new(prompt, completion))
}

/// Parse one SSE payload. `[DONE]` closes the stream; a finish reason
/// produces `Done` directly.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
    {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }
    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        events.push(Ok(StreamEvent::Done {
            usage: v.get("usage").and_then(parse_openai_usage),
            finish_reason: Some(fr.to_string()),
        }));
    }
    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for LmStudioProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        if self.simulate {
            return Ok(ChatResponse {
                content: simulated_reply(req),
                usage: None,
                model: "simulated".into(),
                finish_reason: Some("stop".into()),
            });
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, false).await;
        tracing::debug!(provider = %self.id, model = %body["model"], "lmstudio chat request");

        let resp = self.post_json(&url, &body).await?;
        let resp_json: Value = resp.json().await.map_err(from_reqwest)?;
        parse_chat_response(&self.id, &resp_json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        if self.simulate {
            let chunks = simulated_chunks(&simulated_reply(req));
            let stream = async_stream::stream! {
                for text in chunks {
                    yield Ok(StreamEvent::Token { text });
                }
                yield Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("stop".into()),
                });
            };
            return Ok(Box::pin(stream));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, true).await;
        tracing::debug!(provider = %self.id, model = %body["model"], "lmstudio stream request");

        let resp = self.post_json(&url, &body).await?;
        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        if self.simulate {
            return Ok(EmbeddingsResponse {
                embeddings: vec![vec![0.1; SIMULATED_EMBEDDING_DIM]; req.input.len()],
            });
        }

        let model = req.model.unwrap_or_else(|| self.embedding_model.clone());
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({ "model": model, "input": req.input });

        let resp = self.post_json(&url, &body).await?;
        let resp_json: Value = resp.json().await.map_err(from_reqwest)?;
        let data = resp_json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Provider {
                provider: self.id.clone(),
                message: "missing 'data' array in embeddings response".into(),
            })?;

        let embeddings: Vec<Vec<f32>> = data
            .iter()
            .filter_map(|item| {
                let embedding = item.get("embedding")?.as_array()?;
                Some(
                    embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect(),
                )
            })
            .collect();

        Ok(EmbeddingsResponse { embeddings })
    }

    async fn supported_models(&self) -> Result<Vec<String>> {
        if self.simulate {
            return Ok(FALLBACK_MODELS.iter().map(|m| m.to_string()).collect());
        }
        Ok(self
            .loaded_models()
            .await
            .unwrap_or_else(|| FALLBACK_MODELS.iter().map(|m| m.to_string()).collect()))
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
