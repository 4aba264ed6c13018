//! The dispatcher every caller goes through.
//!
//! `UnifiedLlm` owns the provider registry, remembers which provider is
//! active, compresses long histories before sending them, falls back to the
//! next configured provider on transient failures, and keeps a running token
//! count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ed_context::{compress_text, estimate_tokens_by_words, Compression, ContextCompressor};
use ed_domain::config::{CompressionStrategy, Config};
use ed_domain::error::{Error, Result};
use ed_domain::message::{last_user_content, Message};
use ed_domain::stream::{BoxStream, StreamEvent, TokenUsage};
use ed_domain::trace::TraceEvent;
use ed_providers::{ChatRequest, ChatResponse, EmbeddingsRequest, LlmProvider, ProviderRegistry};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-call options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Overrides for a single chat call. Unset fields use the configured
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Model or alias for the active provider. Dropped when falling back.
    pub model: Option<String>,
    /// Force compression on or off; `None` follows `compression.enabled`.
    pub compress: Option<bool>,
    /// Text the relevance filter scores against. Defaults to the last user
    /// message.
    pub query: Option<String>,
    /// Strategy override; `None` uses `compression.strategy`.
    pub strategy: Option<CompressionStrategy>,
}

impl ChatOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn compressed(mut self, on: bool) -> Self {
        self.compress = Some(on);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UnifiedLlm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UnifiedLlm {
    registry: ProviderRegistry,
    active: RwLock<String>,
    fallback_order: Vec<String>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    compression_enabled: bool,
    strategy: CompressionStrategy,
    compressor: ContextCompressor,
    usage: Arc<Mutex<TokenUsage>>,
}

impl UnifiedLlm {
    /// Build every configured provider and select `llm.active_provider`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(ProviderRegistry::from_config(&config.llm), config)
    }

    /// Use an already-populated registry. When the configured active
    /// provider is missing, the first available entry of `fallback_order`
    /// (then any registered provider) takes its place.
    pub fn new(registry: ProviderRegistry, config: &Config) -> Result<Self> {
        let wanted = &config.llm.active_provider;
        let active = if registry.contains(wanted) {
            wanted.clone()
        } else {
            let replacement = config
                .llm
                .fallback_order
                .iter()
                .find(|id| registry.contains(id))
                .cloned()
                .or_else(|| registry.first())
                .ok_or_else(|| {
                    Error::Config("no LLM provider could be initialized".into())
                })?;
            tracing::warn!(
                requested = %wanted,
                using = %replacement,
                "active provider unavailable, using another configured provider"
            );
            replacement
        };

        Ok(Self {
            registry,
            active: RwLock::new(active),
            fallback_order: config.llm.fallback_order.clone(),
            timeout: Duration::from_millis(config.llm.default_timeout_ms),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            compression_enabled: config.compression.enabled,
            strategy: config.compression.strategy,
            compressor: ContextCompressor::new(config.compression.clone()),
            usage: Arc::new(Mutex::new(TokenUsage::default())),
        })
    }

    // ── Provider selection ─────────────────────────────────────────

    /// Id of the active provider.
    pub fn provider(&self) -> String {
        self.active.read().clone()
    }

    /// Registered provider ids, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.registry.list_providers()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn set_provider(&self, id: &str) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(Error::UnknownProvider(id.to_string()));
        }
        let previous = std::mem::replace(&mut *self.active.write(), id.to_string());
        if previous != id {
            tracing::info!(from = %previous, to = %id, "active provider switched");
            TraceEvent::ProviderSwitched {
                from: previous,
                to: id.to_string(),
            }
            .emit();
        }
        Ok(())
    }

    fn active_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let id = self.provider();
        self.registry.get(&id).ok_or(Error::UnknownProvider(id))
    }

    /// Active provider first, then `fallback_order` without duplicates.
    fn attempt_order(&self, active: &str) -> Vec<String> {
        let mut order = vec![active.to_string()];
        for id in &self.fallback_order {
            if !order.contains(id) && self.registry.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }

    // ── Messages and compression ───────────────────────────────────

    /// Build a message, rejecting unknown role names.
    pub fn create_message(&self, role: &str, content: impl Into<String>) -> Result<Message> {
        Message::new(role, content)
    }

    pub fn compressor(&self) -> &ContextCompressor {
        &self.compressor
    }

    /// Run the configured compression over `messages`.
    pub fn compress_messages(&self, messages: &[Message], opts: &ChatOptions) -> Compression {
        let query = opts
            .query
            .as_deref()
            .or_else(|| last_user_content(messages))
            .unwrap_or("");
        let strategy = opts.strategy.unwrap_or(self.strategy);
        self.compressor.compress(messages, query, strategy)
    }

    fn prepare(&self, messages: &[Message], opts: &ChatOptions) -> Vec<Message> {
        if opts.compress.unwrap_or(self.compression_enabled) {
            let outcome = self.compress_messages(messages, opts);
            if outcome.was_applied() {
                tracing::debug!(
                    dropped = outcome.dropped,
                    tokens_before = outcome.tokens_before,
                    tokens_after = outcome.tokens_after,
                    "history compressed before sending"
                );
            }
            outcome.messages
        } else {
            messages.to_vec()
        }
    }

    fn build_request(&self, messages: Vec<Message>, opts: &ChatOptions) -> ChatRequest {
        ChatRequest {
            messages,
            max_tokens: Some(opts.max_tokens.unwrap_or(self.max_tokens)),
            temperature: Some(opts.temperature.unwrap_or(self.temperature)),
            model: opts.model.clone(),
        }
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Send `messages` to the active provider, falling back on transient
    /// errors.
    pub async fn chat(&self, messages: &[Message], opts: ChatOptions) -> Result<ChatResponse> {
        let req = self.build_request(self.prepare(messages, &opts), &opts);
        let active = self.provider();

        let mut last_err: Option<Error> = None;
        let mut previous: Option<String> = None;

        for id in self.attempt_order(&active) {
            let Some(provider) = self.registry.get(&id) else {
                continue;
            };

            let attempt = if let Some(from) = previous.take() {
                let reason = last_err.as_ref().map(|e| e.to_string()).unwrap_or_default();
                tracing::warn!(from = %from, to = %id, reason = %reason, "falling back to next provider");
                TraceEvent::LlmFallback {
                    from_provider: from,
                    to_provider: id.clone(),
                    reason,
                }
                .emit();
                ChatRequest {
                    model: None,
                    ..req.clone()
                }
            } else {
                req.clone()
            };

            match self.send(provider.as_ref(), &attempt).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retriable() => {
                    tracing::warn!(provider = %id, error = %e, "transient provider failure");
                    previous = Some(id);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(Error::UnknownProvider(active)))
    }

    async fn send(&self, provider: &dyn LlmProvider, req: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let resp = tokio::time::timeout(self.timeout, provider.chat(req))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} did not answer within {} ms",
                    provider.provider_id(),
                    self.timeout.as_millis()
                ))
            })??;

        if let Some(usage) = &resp.usage {
            self.usage.lock().add(usage);
        }

        TraceEvent::LlmRequest {
            provider: provider.provider_id().to_string(),
            model: resp.model.clone(),
            streaming: false,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: resp.usage.map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(resp)
    }

    /// Stream a reply from the active provider. Usage reported in the final
    /// `Done` event is added to the running totals.
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        opts: ChatOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let provider = self.active_provider()?;
        let req = self.build_request(self.prepare(messages, &opts), &opts);

        let started = Instant::now();
        let mut inner = provider.chat_stream(&req).await?;
        let usage_totals = Arc::clone(&self.usage);
        let provider_id = provider.provider_id().to_string();
        let model = req.model.clone().unwrap_or_else(|| "default".into());

        let stream = async_stream::stream! {
            while let Some(event) = inner.next().await {
                if let Ok(StreamEvent::Done { usage, .. }) = &event {
                    if let Some(u) = usage {
                        usage_totals.lock().add(u);
                    }
                    TraceEvent::LlmRequest {
                        provider: provider_id.clone(),
                        model: model.clone(),
                        streaming: true,
                        duration_ms: started.elapsed().as_millis() as u64,
                        prompt_tokens: usage.map(|u| u.prompt_tokens),
                        completion_tokens: usage.map(|u| u.completion_tokens),
                    }
                    .emit();
                }
                yield event;
            }
        };
        Ok(Box::pin(stream))
    }

    /// One-shot completion: `context` (when given) precedes `prompt` in a
    /// single user message.
    pub async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        opts: ChatOptions,
    ) -> Result<String> {
        let content = match context {
            Some(ctx) if !ctx.is_empty() => format!("{ctx}\n\n{prompt}"),
            _ => prompt.to_string(),
        };
        let resp = self.chat(&[Message::user(content)], opts).await?;
        Ok(resp.content)
    }

    // ── Other provider operations ──────────────────────────────────

    /// Embed one text with the active provider.
    pub async fn embed(&self, text: &str, model: Option<String>) -> Result<Vec<f32>> {
        let provider = self.active_provider()?;
        let resp = provider
            .embeddings(EmbeddingsRequest {
                input: vec![text.to_string()],
                model,
            })
            .await?;
        resp.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider {
                provider: provider.provider_id().to_string(),
                message: "empty embeddings response".into(),
            })
    }

    pub async fn supported_models(&self) -> Result<Vec<String>> {
        self.active_provider()?.supported_models().await
    }

    // ── Accounting and text helpers ────────────────────────────────

    pub fn token_usage(&self) -> TokenUsage {
        *self.usage.lock()
    }

    pub fn reset_token_usage(&self) {
        self.usage.lock().reset();
    }

    /// Words × 1.3, the estimate used for free text.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        estimate_tokens_by_words(text)
    }

    pub fn compress_text(&self, text: &str, max_tokens: usize) -> String {
        compress_text(text, max_tokens)
    }
}
