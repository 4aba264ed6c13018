//! Message-history compression.
//!
//! Every strategy keeps system messages and preserves the original order of
//! whatever it keeps. Nothing here calls a model: [`ContextCompressor::summary_request`]
//! only builds the prompt, the dispatcher decides whether to send it.

use std::collections::HashSet;

use ed_domain::config::{CompressionConfig, CompressionStrategy};
use ed_domain::message::Message;
use ed_domain::trace::TraceEvent;

use crate::tokens::{estimate_message_tokens, estimate_tokens};

/// Outcome of [`ContextCompressor::compress`].
#[derive(Debug, Clone)]
pub struct Compression {
    pub messages: Vec<Message>,
    /// `None` when the history already fit the budget.
    pub strategy_used: Option<CompressionStrategy>,
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// Number of input messages not carried over verbatim.
    pub dropped: usize,
}

impl Compression {
    pub fn was_applied(&self) -> bool {
        self.strategy_used.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextCompressor {
    config: CompressionConfig,
}

impl ContextCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// System messages plus the most recent non-system messages, `window`
    /// messages in total.
    pub fn sliding_window(&self, messages: &[Message], window: usize) -> Vec<Message> {
        if messages.len() <= window {
            return messages.to_vec();
        }

        let system_count = messages.iter().filter(|m| m.is_system()).count();
        let keep = window.saturating_sub(system_count);

        let non_system: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        let recent = &non_system[non_system.len().saturating_sub(keep)..];

        messages
            .iter()
            .filter(|m| m.is_system())
            .chain(recent.iter().copied())
            .cloned()
            .collect()
    }

    /// Keep system messages, the last two messages, and messages sharing
    /// enough vocabulary with `query`. At most `relevance_keep` non-system
    /// messages survive, the most recent ones winning.
    pub fn relevance_filter(&self, messages: &[Message], query: &str, threshold: f32) -> Vec<Message> {
        if messages.len() <= 2 {
            return messages.to_vec();
        }

        let query_words = vocabulary(query);
        let tail_start = messages.len() - 2;

        let candidates: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(i, m)| {
                !m.is_system()
                    && (*i >= tail_start || overlap(&query_words, &m.content) >= threshold)
            })
            .map(|(i, _)| i)
            .collect();

        let cap = self.config.relevance_keep.max(2);
        let kept: HashSet<usize> = candidates
            .iter()
            .rev()
            .take(cap)
            .copied()
            .collect();

        messages
            .iter()
            .enumerate()
            .filter(|(i, m)| m.is_system() || kept.contains(i))
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// A user turn asking the model to summarize `messages`.
    pub fn summary_request(&self, messages: &[Message], max_tokens: usize) -> Message {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        Message::user(format!(
            "Here is a conversation between a user and an AI assistant:\n\n\
             {transcript}\n\n\
             Summarize this conversation, keeping ALL important information: \
             facts, stated preferences and decisions taken.\n\
             Be concise but complete, staying within about {max_tokens} tokens."
        ))
    }

    /// Shrink `messages` when they, together with `query`, exceed the
    /// configured token target.
    pub fn compress(
        &self,
        messages: &[Message],
        query: &str,
        strategy: CompressionStrategy,
    ) -> Compression {
        let tokens_before = estimate_message_tokens(messages) + estimate_tokens(query);

        if tokens_before <= self.config.target_token_limit {
            return Compression {
                messages: messages.to_vec(),
                strategy_used: None,
                tokens_before,
                tokens_after: tokens_before,
                dropped: 0,
            };
        }

        let (compressed, used) = match strategy {
            CompressionStrategy::Sliding => (
                self.sliding_window(messages, self.config.window_size),
                CompressionStrategy::Sliding,
            ),
            CompressionStrategy::Relevance => (
                self.relevance_filter(messages, query, self.config.relevance_threshold),
                CompressionStrategy::Relevance,
            ),
            CompressionStrategy::Summary => (self.condense(messages), CompressionStrategy::Summary),
            CompressionStrategy::Hybrid => self.hybrid(messages, query),
        };

        let tokens_after = estimate_message_tokens(&compressed) + estimate_tokens(query);
        let dropped = count_dropped(messages, &compressed);

        TraceEvent::ContextCompressed {
            strategy: used.as_str().into(),
            messages_before: messages.len(),
            messages_after: compressed.len(),
            tokens_before,
            tokens_after,
        }
        .emit();

        Compression {
            messages: compressed,
            strategy_used: Some(used),
            tokens_before,
            tokens_after,
            dropped,
        }
    }

    fn hybrid(&self, messages: &[Message], query: &str) -> (Vec<Message>, CompressionStrategy) {
        let len = messages.len();
        if len < self.config.hybrid_small {
            (
                self.sliding_window(messages, self.config.window_size),
                CompressionStrategy::Sliding,
            )
        } else if len < self.config.hybrid_medium {
            (
                self.relevance_filter(messages, query, self.config.relevance_threshold),
                CompressionStrategy::Relevance,
            )
        } else {
            (self.condense(messages), CompressionStrategy::Summary)
        }
    }

    /// System messages, a note standing in for the older turns, then the
    /// `hybrid_recent` latest non-system messages.
    fn condense(&self, messages: &[Message]) -> Vec<Message> {
        let non_system: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        let recent_start = non_system.len().saturating_sub(self.config.hybrid_recent);
        let omitted = recent_start;

        let mut out: Vec<Message> = messages.iter().filter(|m| m.is_system()).cloned().collect();
        if omitted > 0 {
            out.push(omitted_note(omitted));
        }
        out.extend(non_system[recent_start..].iter().map(|m| (*m).clone()));
        out
    }
}

/// The placeholder inserted where older messages were cut.
pub fn omitted_note(count: usize) -> Message {
    Message::system(format!(
        "Summary of the earlier conversation: {count} messages omitted to keep \
         the context within budget."
    ))
}

fn count_dropped(before: &[Message], after: &[Message]) -> usize {
    let carried = after.iter().filter(|m| before.contains(m)).count();
    before.len().saturating_sub(carried)
}

fn vocabulary(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Share of the query's vocabulary present in `content`.
fn overlap(query_words: &HashSet<String>, content: &str) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words = vocabulary(content);
    let shared = query_words.intersection(&content_words).count();
    shared as f32 / query_words.len() as f32
}
