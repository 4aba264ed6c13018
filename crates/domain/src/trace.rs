use serde::Serialize;

/// Structured trace events emitted across all edition crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        to_provider: String,
        reason: String,
    },
    ModelFallback {
        provider: String,
        from_model: String,
        to_model: String,
    },
    ContextCompressed {
        strategy: String,
        messages_before: usize,
        messages_after: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    ProviderSwitched {
        from: String,
        to: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "edition_event");
    }
}
