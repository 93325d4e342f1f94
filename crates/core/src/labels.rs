//! Human-readable labels and lexical query matches for nodes.

use crate::models::Node;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Metadata keys consulted for a label, highest priority first.
pub const LABEL_KEYS: [&str; 6] = ["label", "title", "name", "keyword", "heading", "topic"];

const CONTENT_LABEL_WORDS: usize = 3;
const CONTENT_LABEL_MAX_CHARS: usize = 40;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("static token pattern is valid"))
}

fn sentence_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[.!?]\s+").expect("static sentence pattern is valid"))
}

pub fn derive_label(node: &Node) -> String {
    for key in LABEL_KEYS {
        if let Some(label) = node.metadata.get(key).and_then(non_empty_str) {
            return label.to_string();
        }
    }

    if let Some(keyword) = node
        .metadata
        .get("keywords")
        .and_then(Value::as_array)
        .and_then(|keywords| keywords.iter().find_map(non_empty_str))
    {
        return keyword.to_string();
    }

    let leading = node
        .content
        .split_whitespace()
        .take(CONTENT_LABEL_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if !leading.is_empty() {
        return truncate_label(&leading);
    }

    node.id.clone()
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn truncate_label(text: &str) -> String {
    if text.chars().count() <= CONTENT_LABEL_MAX_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(CONTENT_LABEL_MAX_CHARS).collect();
    truncated.push('…');
    truncated
}

/// Lowercased `[a-z0-9]+` runs, deduplicated.
pub fn tokenize(text: &str) -> HashSet<String> {
    ordered_tokens(text).into_iter().collect()
}

fn ordered_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|token| token.as_str().to_string())
        .collect()
}

/// Sentences split after `.`, `!` or `?` followed by whitespace; punctuation stays attached.
pub fn split_sentences(content: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_boundary().find_iter(content) {
        // The terminator is a single ASCII byte.
        let end = boundary.start() + 1;
        push_trimmed(&mut sentences, &content[start..end]);
        start = boundary.end();
    }
    push_trimmed(&mut sentences, &content[start..]);

    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}

pub fn extract_matching_sentence(content: &str, query_tokens: &HashSet<String>) -> Option<String> {
    if content.trim().is_empty() || query_tokens.is_empty() {
        return None;
    }

    let sentences = split_sentences(content);
    sentences
        .iter()
        .find(|sentence| {
            ordered_tokens(sentence)
                .iter()
                .any(|token| query_tokens.contains(token))
        })
        .or_else(|| sentences.first())
        .map(|sentence| sentence.to_string())
}

/// Content tokens that also occur in the query, in order of first appearance.
pub fn extract_matching_words(content: &str, query_tokens: &HashSet<String>) -> Vec<String> {
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    ordered_tokens(content)
        .into_iter()
        .filter(|token| query_tokens.contains(token) && seen.insert(token.clone()))
        .collect()
}
