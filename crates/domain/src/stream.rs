use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text fragment of the response.
    #[serde(rename = "token")]
    Token { text: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error reported by the provider inside the stream.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a single completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Running token totals across many completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub requests: u64,
}

impl TokenUsage {
    pub fn add(&mut self, usage: &Usage) {
        self.prompt += u64::from(usage.prompt_tokens);
        self.completion += u64::from(usage.completion_tokens);
        self.total += u64::from(usage.total_tokens);
        self.requests += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_accumulates_and_resets() {
        let mut totals = TokenUsage::default();
        totals.add(&Usage::new(120, 30));
        totals.add(&Usage::new(80, 20));
        assert_eq!(totals.prompt, 200);
        assert_eq!(totals.completion, 50);
        assert_eq!(totals.total, 250);
        assert_eq!(totals.requests, 2);

        totals.reset();
        assert_eq!(totals, TokenUsage::default());
    }

    #[test]
    fn usage_total_saturates() {
        let usage = Usage::new(u32::MAX, 10);
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[test]
    fn stream_event_tagged_serialization() {
        let json = serde_json::to_string(&StreamEvent::Token { text: "Il".into() }).unwrap();
        assert_eq!(json, r#"{"type":"token","text":"Il"}"#);
    }
}
