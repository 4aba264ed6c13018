//! Word-budget trimming for long documents (manuscripts, notes, reports).
//!
//! Markdown documents with a `# ` title and `## ` sections keep their
//! outline: every section gets an equal share of the budget and its body is
//! clipped in the middle. Anything else keeps its opening and closing words.

use std::sync::LazyLock;

use regex::Regex;

use crate::tokens::{estimate_tokens_by_words, tokens_to_words, words_to_tokens};

const SECTION_ELLIPSIS: &str = "...";
const TEXT_ELLIPSIS: &str = "[...]";

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+.+$").expect("title pattern"));

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##[ \t]+.+$").expect("section pattern"));

struct Section<'a> {
    heading: &'a str,
    body: &'a str,
}

/// Trim `text` so that its word-based token estimate fits `max_tokens`.
///
/// Text already under budget is returned unchanged.
pub fn compress_text(text: &str, max_tokens: usize) -> String {
    let estimated = estimate_tokens_by_words(text);
    if estimated <= max_tokens {
        return text.to_string();
    }

    let title = TITLE.find(text).map(|m| m.as_str().trim_end());
    let sections = split_sections(text);

    match title {
        Some(title) if !sections.is_empty() => compress_outline(title, &sections, max_tokens),
        _ => compress_plain(text, max_tokens, estimated),
    }
}

/// Each `## ` heading and the text up to the next one.
fn split_sections(text: &str) -> Vec<Section<'_>> {
    let headings: Vec<regex::Match<'_>> = SECTION_HEADING.find_iter(text).collect();

    headings
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let body_end = headings.get(i + 1).map(|next| next.start()).unwrap_or(text.len());
            Section {
                heading: m.as_str().trim_end(),
                body: text[m.end()..body_end].trim(),
            }
        })
        .collect()
}

fn compress_outline(title: &str, sections: &[Section<'_>], max_tokens: usize) -> String {
    let title_tokens = words_to_tokens(title.split_whitespace().count()) as f64;
    let per_section = (max_tokens as f64 - title_tokens) / sections.len() as f64;

    let parts: Vec<String> = sections
        .iter()
        .map(|s| {
            let heading_tokens = words_to_tokens(s.heading.split_whitespace().count()) as f64;
            let max_words = tokens_to_words(per_section - heading_tokens);
            let words: Vec<&str> = s.body.split_whitespace().collect();

            let body = if words.len() > max_words {
                clip_middle(&words, max_words / 2, max_words / 2, SECTION_ELLIPSIS)
            } else {
                s.body.to_string()
            };
            format!("{}\n\n{}", s.heading, body)
        })
        .collect();

    format!("{}\n\n{}", title, parts.join("\n\n"))
}

fn compress_plain(text: &str, max_tokens: usize, estimated: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let ratio = max_tokens as f64 / estimated as f64;
    let max_words = (words.len() as f64 * ratio) as usize;

    let head = max_words * 2 / 3;
    let tail = max_words - head;
    clip_middle(&words, head, tail, TEXT_ELLIPSIS)
}

fn clip_middle(words: &[&str], head: usize, tail: usize, marker: &str) -> String {
    let head = head.min(words.len());
    let tail = tail.min(words.len() - head);

    let mut out: Vec<&str> = Vec::with_capacity(head + tail + 1);
    out.extend_from_slice(&words[..head]);
    out.push(marker);
    out.extend_from_slice(&words[words.len() - tail..]);
    out.join(" ")
}
