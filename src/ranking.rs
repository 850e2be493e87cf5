//! Picks the posts worth keeping from one source's recent timeline.

use std::cmp::Reverse;

use crate::storage::ContentItem;

/// Recent posts fetched per scan.
pub const DEFAULT_TIMELINE_COUNT: u32 = 50;

/// Posts kept per scan.
pub const DEFAULT_TOP_K: usize = 5;

/// Return the `k` best items by engagement score (favorites + reposts),
/// highest first.
///
/// Items scoring zero or less are never selected. Equal scores are ordered
/// newer first: larger numeric identity first, identities that do not parse
/// after all numeric ones, then by position in `items` (expected newest first).
pub fn select_top(items: Vec<ContentItem>, k: usize) -> Vec<ContentItem> {
    let mut scored: Vec<(i64, Reverse<Option<u64>>, usize, ContentItem)> = items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let recency = Reverse(item.id.parse::<u64>().ok());
            (item.score(), recency, position, item)
        })
        .filter(|(score, _, _, _)| *score > 0)
        .collect();

    scored.sort_by(|(score_a, recency_a, pos_a, _), (score_b, recency_b, pos_b, _)| {
        score_b
            .cmp(score_a)
            .then_with(|| recency_a.cmp(recency_b))
            .then_with(|| pos_a.cmp(pos_b))
    });

    scored
        .into_iter()
        .take(k)
        .map(|(_, _, _, item)| item)
        .collect()
}
