//! Text classifiers: semantic type and confidence.
//!
//! Pure rule-table lookups over the lowercased concatenation of title and
//! content. These functions never fail; at worst they degrade to the default
//! classification.

use crate::config::{ConfidenceMarkers, TypeRule};
use crate::types::{Confidence, ItemType};

/// Classify the semantic type of a (title, content) pair.
///
/// Counts how many of each type's keywords appear in the text and picks the
/// type with the strictly highest count. Ties resolve by the fixed priority
/// order decision > config > procedure > design_note, independent of table
/// order. An all-zero score defaults to decision.
pub fn judge_type(rules: &[TypeRule], title: &str, content: &str) -> ItemType {
    let text = format!("{title} {content}").to_lowercase();

    let mut scores: Vec<(ItemType, usize)> = Vec::with_capacity(rules.len());
    for rule in rules {
        let score = rule.keywords.iter().filter(|k| text.contains(k.as_str())).count();
        scores.push((rule.item_type, score));
    }

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    if best == 0 {
        return ItemType::Decision;
    }

    for ty in ItemType::PRIORITY_ORDER {
        if scores.iter().any(|(t, s)| *t == ty && *s == best) {
            return ty;
        }
    }

    ItemType::Decision
}

/// Classify the confidence of a (title, content, type) triple.
///
/// HIGH requires a decisive phrasing marker, a concrete token (a numeral or
/// a capitalized word), and a decision/config type. Recommendation phrasing
/// or a procedure type yields MED; everything else is LOW.
pub fn judge_confidence(
    markers: &ConfidenceMarkers,
    title: &str,
    content: &str,
    item_type: ItemType,
) -> Confidence {
    let text = format!("{title} {content}").to_lowercase();

    let has_decisive = markers.decisive.iter().any(|m| text.contains(m.as_str()));
    let has_concrete = has_concrete_token(&format!("{title}{content}"));

    if has_decisive
        && has_concrete
        && matches!(item_type, ItemType::Decision | ItemType::Config)
    {
        return Confidence::High;
    }

    let has_recommendation = markers
        .recommendation
        .iter()
        .any(|m| text.contains(m.as_str()));

    if has_recommendation || item_type == ItemType::Procedure {
        return Confidence::Med;
    }

    Confidence::Low
}

/// A concrete token is a numeral or an ASCII capitalized word (an uppercase
/// letter immediately followed by a lowercase one). Checked on the raw text,
/// before lowercasing.
fn has_concrete_token(text: &str) -> bool {
    let mut prev_upper = false;
    for c in text.chars() {
        if c.is_numeric() {
            return true;
        }
        if prev_upper && c.is_ascii_lowercase() {
            return true;
        }
        prev_upper = c.is_ascii_uppercase();
    }
    false
}
