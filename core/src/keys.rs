//! Key assignment: the map tier and the token-sufficiency gate.
//!
//! Tier orchestration (map match → similarity fallback → misc bucket) lives
//! on `VersionStore::suggest_key`, because the similarity tier needs the
//! index. The pieces here are pure and never fail.

use crate::config::KeyTables;
use crate::types::KeyLayer;

/// Sentinel key returned when no tier produces a match
pub const MISC_KEY: &str = "misc_operation";

/// Layer of the sentinel key
pub const MISC_LAYER: KeyLayer = KeyLayer::Operation;

/// Keyword-map key matcher over immutable, ordered tables
pub struct KeyClassifier<'a> {
    tables: &'a KeyTables,
}

impl<'a> KeyClassifier<'a> {
    pub fn new(tables: &'a KeyTables) -> Self {
        Self { tables }
    }

    /// Scan the constitution table, then the operation table, returning the
    /// first key with a keyword that is a case-insensitive substring of
    /// `title + " " + content`. Table order decides between multiple hits.
    pub fn match_by_map(&self, title: &str, content: &str) -> Option<(String, KeyLayer)> {
        let text = format!("{title} {content}").to_lowercase();

        for rule in &self.tables.constitution {
            if rule.patterns.iter().any(|p| text.contains(&p.to_lowercase())) {
                return Some((rule.key.clone(), KeyLayer::Constitution));
            }
        }

        for rule in &self.tables.operation {
            if rule.patterns.iter().any(|p| text.contains(&p.to_lowercase())) {
                return Some((rule.key.clone(), KeyLayer::Operation));
            }
        }

        None
    }
}

/// Extract `[A-Za-z0-9_]+` tokens of length >= 2.
///
/// Non-ASCII script content (kana, kanji, ...) contributes no tokens; such
/// text is handled by the map tier, never by similarity search.
pub fn alphanumeric_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            if current.len() >= 2 {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        tokens.push(current);
    }

    tokens
}

/// Token-sufficiency gate for the similarity fallback: at least two
/// alphanumeric tokens of length >= 2.
pub fn has_enough_tokens(text: &str) -> bool {
    alphanumeric_tokens(text).len() >= 2
}
