//! Content analysis: run an editorial instruction over a piece of text.

use ed_domain::error::Result;
use ed_domain::message::Message;

use crate::unified::{ChatOptions, UnifiedLlm};

/// Thin wrapper that frames an instruction as the system prompt and the
/// analysed text as the user turn.
pub struct Analyst<'a> {
    llm: &'a UnifiedLlm,
    options: ChatOptions,
}

impl<'a> Analyst<'a> {
    pub fn new(llm: &'a UnifiedLlm) -> Self {
        Self {
            llm,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyse `content` following `instruction` and return the model's
    /// answer.
    #[tracing::instrument(skip_all, fields(content_len = content.len()))]
    pub async fn analyze_content(&self, content: &str, instruction: &str) -> Result<String> {
        let messages = [Message::system(instruction), Message::user(content)];
        let resp = self.llm.chat(&messages, self.options.clone()).await?;
        tracing::debug!(response_len = resp.content.len(), "analysis complete");
        Ok(resp.content)
    }
}
