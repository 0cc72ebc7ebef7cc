//! The retrieval tokenizer. Corpus text and queries must both go through
//! [`tokenize`] or BM25 scores are meaningless.

use regex::Regex;
use std::sync::OnceLock;

fn punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `\w` is Unicode-aware; the Hangul syllable block is kept explicitly.
    RE.get_or_init(|| Regex::new(r"[^\w\s가-힣]").expect("static pattern is valid"))
}

/// Lowercases, replaces punctuation with spaces and splits on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    punctuation()
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
