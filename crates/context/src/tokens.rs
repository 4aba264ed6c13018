//! Cheap token estimates.
//!
//! Neither estimator is exact. The character rule is used for message
//! budgets; the word rule for free text such as documents being trimmed.

use ed_domain::message::Message;

/// Roughly four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Roughly 1.3 tokens per whitespace-separated word.
pub fn estimate_tokens_by_words(text: &str) -> usize {
    words_to_tokens(text.split_whitespace().count())
}

/// Sum of [`estimate_tokens`] over the message contents.
pub fn estimate_message_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

pub(crate) fn words_to_tokens(words: usize) -> usize {
    (words as f64 * 1.3) as usize
}

pub(crate) fn tokens_to_words(tokens: f64) -> usize {
    if tokens <= 0.0 {
        0
    } else {
        (tokens / 1.3) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        // Multi-byte characters count once.
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn word_estimate() {
        assert_eq!(estimate_tokens_by_words("un deux trois quatre cinq six sept huit neuf dix"), 13);
        assert_eq!(estimate_tokens_by_words("   "), 0);
    }

    #[test]
    fn message_sum() {
        let msgs = vec![Message::user("abcd"), Message::assistant("abcdefgh")];
        assert_eq!(estimate_message_tokens(&msgs), 3);
    }
}
