//! Text normalization shared by indexing and querying

use rust_stemmers::{Algorithm, Stemmer};
use std::sync::OnceLock;

/// Porter stemmer for English text
static STEMMER: OnceLock<Stemmer> = OnceLock::new();

fn get_stemmer() -> &'static Stemmer {
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Word tokenizer: lowercase, split on non-alphanumeric characters, drop empty tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Tokenize text with optional Porter stemming
///
/// When `stem` is true, "channel" and "channels" index under the same term.
pub fn tokenize_with_stemming(text: &str, stem: bool) -> Vec<String> {
    let tokens = tokenize(text);
    if !stem {
        return tokens;
    }

    let stemmer = get_stemmer();
    tokens.iter().map(|t| stemmer.stem(t).to_string()).collect()
}

/// Normalize a tag into its posting key.
///
/// Tags are stored verbatim on the record; lookups are case-insensitive.
pub fn tag_key(tag: &str) -> String {
    tag.trim().to_lowercase()
}
