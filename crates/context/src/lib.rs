pub mod compressor;
pub mod text;
pub mod tokens;

pub use compressor::{Compression, ContextCompressor};
pub use text::compress_text;
pub use tokens::{estimate_message_tokens, estimate_tokens, estimate_tokens_by_words};
