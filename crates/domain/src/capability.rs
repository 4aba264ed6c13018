use serde::{Deserialize, Serialize};

/// What a provider can do. Every adapter advertises one of these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_streaming: bool,
    pub supports_embeddings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}
