// src/core/normalize.rs
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Anything that is neither a word character nor whitespace.
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").unwrap();
}

/// Lower-cases a word and strips punctuation.
///
/// Idempotent: `normalize(&normalize(w)) == normalize(w)`.
pub fn normalize(word: &str) -> String {
    PUNCTUATION.replace_all(&word.to_lowercase(), "").into_owned()
}

/// Splits a line into normalized tokens, dropping tokens that were pure
/// punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
