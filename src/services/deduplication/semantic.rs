//! Semantic similarity matching.
//!
//! Compares a candidate embedding against recent items by cosine similarity
//! mapped to `[0, 1]`, and picks the best match above the threshold.

use crate::embedding::cosine_similarity;
use crate::models::{Embedding, IndexedItem};

use super::config::TieBreak;

/// Maps raw cosine similarity in `[-1, 1]` to a score in `[0, 1]`.
///
/// Orthogonal vectors score exactly `0.5`; identical directions score `1.0`.
#[must_use]
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    let cosine = cosine_similarity(a, b);
    f32::midpoint(cosine, 1.0).clamp(0.0, 1.0)
}

/// Builds the text an item is embedded from.
///
/// Title, a truncated body and the source host. The body is cut at
/// `content_chars` characters (not bytes) with an ellipsis when truncated.
#[must_use]
pub fn similarity_text(title: &str, body: &str, host: &str, content_chars: usize) -> String {
    let body = body.trim();
    let content = if body.chars().count() > content_chars {
        let cut: String = body.chars().take(content_chars).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    };
    format!("Title: {}\n\nContent: {content}\n\nSource: {host}", title.trim())
}

/// A comparison target with its resolved embedding.
#[derive(Debug, Clone)]
pub struct SemanticTarget {
    /// The indexed item.
    pub item: IndexedItem,
    /// Its embedding.
    pub embedding: Embedding,
}

/// The best semantic match found for a candidate.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    /// The matched item.
    pub item: IndexedItem,
    /// Normalized similarity score.
    pub score: f32,
}

/// Picks the best target for `candidate`.
///
/// Returns the highest scoring target regardless of threshold (the caller
/// compares). Exactly equal scores resolve by `tie_break` on publication time,
/// then in favour of the target that appears later in `targets`.
#[must_use]
pub fn best_match(
    candidate: &[f32],
    targets: &[SemanticTarget],
    tie_break: TieBreak,
) -> Option<SemanticMatch> {
    let mut best: Option<(&SemanticTarget, f32)> = None;

    for target in targets {
        let score = similarity_score(candidate, &target.embedding);
        let replace = match best {
            None => true,
            Some((current, current_score)) => {
                if score > current_score {
                    true
                } else if score < current_score {
                    false
                } else {
                    prefer_on_tie(&target.item, &current.item, tie_break)
                }
            },
        };
        if replace {
            best = Some((target, score));
        }
    }

    best.map(|(target, score)| SemanticMatch {
        item: target.item.clone(),
        score,
    })
}

/// Returns true if `challenger` should replace `current` on an exact tie.
fn prefer_on_tie(challenger: &IndexedItem, current: &IndexedItem, tie_break: TieBreak) -> bool {
    match tie_break {
        TieBreak::MostRecentlyPublished => challenger.published_at >= current.published_at,
        TieBreak::EarliestPublished => challenger.published_at <= current.published_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fingerprint;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn target(name: &str, day: u32, vector: &[f32]) -> SemanticTarget {
        let published_at = Utc.with_ymd_and_hms(2025, 5, day, 0, 0, 0).unwrap();
        SemanticTarget {
            item: IndexedItem {
                url: format!("https://example.com/{name}"),
                url_key: format!("example.com/{name}"),
                fingerprint: Fingerprint::new(name),
                title: name.to_string(),
                source_id: "test".to_string(),
                similarity_text: String::new(),
                embedding: None,
                published_at,
                accepted_at: published_at,
            },
            embedding: Arc::from(vector.to_vec()),
        }
    }

    #[test]
    fn test_similarity_score_mapping() {
        assert!((similarity_score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((similarity_score(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < f32::EPSILON);
        assert!(similarity_score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_text_truncates_on_chars() {
        let text = similarity_text("  Title ", "ééééé", "example.com", 3);
        assert_eq!(text, "Title: Title\n\nContent: ééé...\n\nSource: example.com");

        let short = similarity_text("T", "body", "h", 10);
        assert_eq!(short, "Title: T\n\nContent: body\n\nSource: h");
    }

    #[test]
    fn test_best_match_highest_score_wins() {
        let targets = vec![
            target("far", 1, &[0.0, 1.0]),
            target("near", 2, &[1.0, 0.1]),
        ];
        let best = best_match(&[1.0, 0.0], &targets, TieBreak::default()).unwrap();
        assert_eq!(best.item.title, "near");
    }

    #[test]
    fn test_tie_prefers_most_recently_published() {
        let targets = vec![
            target("newer", 9, &[1.0, 0.0]),
            target("older", 3, &[1.0, 0.0]),
        ];
        let best = best_match(&[1.0, 0.0], &targets, TieBreak::MostRecentlyPublished).unwrap();
        assert_eq!(best.item.title, "newer");

        let best = best_match(&[1.0, 0.0], &targets, TieBreak::EarliestPublished).unwrap();
        assert_eq!(best.item.title, "older");
    }

    #[test]
    fn test_full_tie_prefers_later_target() {
        let targets = vec![target("first", 4, &[1.0, 0.0]), target("second", 4, &[1.0, 0.0])];
        let best = best_match(&[1.0, 0.0], &targets, TieBreak::default()).unwrap();
        assert_eq!(best.item.title, "second");
    }

    #[test]
    fn test_best_match_empty() {
        assert!(best_match(&[1.0, 0.0], &[], TieBreak::default()).is_none());
    }
}
