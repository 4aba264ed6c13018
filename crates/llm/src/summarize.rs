//! History compaction: older turns are collapsed into a model-written
//! summary so long editing sessions stay inside the context window.

use ed_domain::error::Result;
use ed_domain::message::Message;

use crate::unified::{ChatOptions, UnifiedLlm};

/// Prefix of the system message that carries a compaction summary.
pub const SUMMARY_PREFIX: &str = "Summary of the earlier conversation:";

/// Split non-system messages into (older, recent). System messages belong
/// to neither half.
pub fn split_for_compaction(messages: &[Message], keep_recent: usize) -> (Vec<Message>, Vec<Message>) {
    let non_system: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
    let keep_from = non_system.len().saturating_sub(keep_recent);

    let older = non_system[..keep_from].iter().map(|m| (*m).clone()).collect();
    let recent = non_system[keep_from..].iter().map(|m| (*m).clone()).collect();
    (older, recent)
}

impl UnifiedLlm {
    /// Ask the active provider for a summary of `messages`. The request is a
    /// single user turn, so it survives adapters that lift system messages
    /// out of the message list.
    pub async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let budget = self.compressor().config().summary_max_tokens;
        let request = self.compressor().summary_request(messages, budget);

        let opts = ChatOptions {
            max_tokens: Some(u32::try_from(budget * 2).unwrap_or(u32::MAX)),
            temperature: Some(0.1),
            compress: Some(false),
            ..Default::default()
        };
        let resp = self.chat(&[request], opts).await?;
        Ok(resp.content.trim().to_string())
    }

    /// Replace everything but the last `keep_recent` non-system messages
    /// with a single summary message. Short histories are returned as is.
    pub async fn compact(&self, messages: &[Message], keep_recent: usize) -> Result<Vec<Message>> {
        let (older, recent) = split_for_compaction(messages, keep_recent);
        if older.is_empty() {
            return Ok(messages.to_vec());
        }

        let summary = self.summarize(&older).await?;
        tracing::info!(
            messages_compacted = older.len(),
            summary_len = summary.len(),
            "conversation compacted"
        );

        let mut out: Vec<Message> = messages.iter().filter(|m| m.is_system()).cloned().collect();
        out.push(Message::system(format!("{SUMMARY_PREFIX}\n{summary}")));
        out.extend(recent);
        Ok(out)
    }
}
