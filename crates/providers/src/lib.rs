pub mod anthropic;
pub mod lmstudio;
pub mod models;
pub mod registry;
pub mod traits;
pub(crate) mod sse;
pub mod util;

// Re-exports for convenience.
pub use anthropic::AnthropicProvider;
pub use lmstudio::LmStudioProvider;
pub use registry::ProviderRegistry;
pub use traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
