use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compression shrinks the message history sent to the model once its
/// estimated size goes over `target_token_limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compress automatically on every chat call.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: CompressionStrategy,
    /// Estimated token count (messages + query) that triggers compression.
    #[serde(default = "d_5000")]
    pub target_token_limit: usize,
    /// Messages kept by the sliding window, system messages included.
    #[serde(default = "d_5")]
    pub window_size: usize,
    /// Upper bound on non-system messages kept by the relevance filter.
    #[serde(default = "d_5")]
    pub relevance_keep: usize,
    /// Minimum lexical overlap with the query for a message to be kept.
    #[serde(default = "d_threshold")]
    pub relevance_threshold: f32,
    /// Hybrid: below this many messages, use the sliding window.
    #[serde(default = "d_10")]
    pub hybrid_small: usize,
    /// Hybrid: below this many messages, use the relevance filter.
    #[serde(default = "d_20")]
    pub hybrid_medium: usize,
    /// Non-system messages kept verbatim when older ones are summarized.
    #[serde(default = "d_8")]
    pub hybrid_recent: usize,
    /// Budget requested for LLM-written summaries.
    #[serde(default = "d_500")]
    pub summary_max_tokens: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: CompressionStrategy::default(),
            target_token_limit: d_5000(),
            window_size: d_5(),
            relevance_keep: d_5(),
            relevance_threshold: d_threshold(),
            hybrid_small: d_10(),
            hybrid_medium: d_20(),
            hybrid_recent: d_8(),
            summary_max_tokens: d_500(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Keep system messages and the most recent turns.
    Sliding,
    /// Keep messages that share vocabulary with the current query.
    Relevance,
    /// Replace older turns with a summary note.
    Summary,
    /// Pick one of the above from the history length.
    #[default]
    Hybrid,
}

impl CompressionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionStrategy::Sliding => "sliding",
            CompressionStrategy::Relevance => "relevance",
            CompressionStrategy::Summary => "summary",
            CompressionStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sliding" => Ok(Self::Sliding),
            "relevance" => Ok(Self::Relevance),
            "summary" => Ok(Self::Summary),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Config(format!("unknown compression strategy '{other}'"))),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_5000() -> usize {
    5000
}
fn d_5() -> usize {
    5
}
fn d_threshold() -> f32 {
    0.2
}
fn d_10() -> usize {
    10
}
fn d_20() -> usize {
    20
}
fn d_8() -> usize {
    8
}
fn d_500() -> usize {
    500
}
