//! Suggestion mining over conversation logs.
//!
//! Scans assistant turns for decision phrasing and turns them into save
//! candidates. Everything here is heuristic and total: bad input degrades to
//! fewer (or zero) suggestions, never an error.

use tracing::debug;

use crate::classify::judge_confidence;
use crate::classify::judge_type;
use crate::config::RuleConfig;
use crate::types::Confidence;
use crate::types::ConversationTurn;
use crate::types::Role;
use crate::types::Suggestion;

/// Mine save candidates from a conversation log.
///
/// Assistant turns containing a decision-phrasing marker become candidates;
/// only HIGH-confidence ones survive, near-duplicate titles within the batch
/// are dropped, and the result is capped at `max_auto_suggestions`.
pub fn extract_suggestions(rules: &RuleConfig, log: &[ConversationTurn]) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = Vec::new();

    for turn in log {
        if turn.role != Role::Assistant {
            continue;
        }
        let text = turn.content.trim();
        if text.is_empty() {
            continue;
        }
        if !rules
            .extractor
            .decision_markers
            .iter()
            .any(|m| text.contains(m.as_str()))
        {
            continue;
        }

        let title = derive_title(text, rules.extractor.max_title_chars);
        let content = truncate_chars(text, rules.extractor.max_content_chars);

        let item_type = judge_type(&rules.type_keywords, &title, &content);
        let confidence = judge_confidence(&rules.confidence, &title, &content, item_type);
        if confidence != Confidence::High {
            debug!(%confidence, title, "candidate below HIGH; skipped");
            continue;
        }

        // Titles whose character overlap exceeds the configured threshold
        // are "the same suggestion said twice".
        if suggestions
            .iter()
            .any(|s| title_similarity(&s.title, &title) > rules.duplicate_threshold)
        {
            debug!(title, "near-duplicate candidate; skipped");
            continue;
        }

        suggestions.push(Suggestion {
            title,
            content,
            item_type,
            confidence,
        });
        if suggestions.len() >= rules.max_auto_suggestions {
            break;
        }
    }

    suggestions
}

/// First line longer than 10 characters, cut at the first sentence
/// terminator and capped. When no line qualifies, falls back to the capped
/// whole text.
fn derive_title(text: &str, max_chars: usize) -> String {
    for line in text.lines() {
        let line = line.trim();
        if line.chars().count() > 10 {
            let sentence = line.split('。').next().unwrap_or(line);
            return truncate_chars(sentence, max_chars);
        }
    }
    truncate_chars(text, max_chars)
}

/// Character-wise truncation (titles and contents are capped in characters,
/// not bytes).
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Character-set overlap of two titles: shared characters over the larger
/// set. More aggressive than Jaccard, so short titles embedded in longer
/// ones still register as duplicates.
fn title_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let sa: HashSet<char> = a.chars().collect();
    let sb: HashSet<char> = b.chars().collect();
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    let common = sa.intersection(&sb).count();
    common as f64 / sa.len().max(sb.len()) as f64
}
