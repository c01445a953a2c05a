//! Duplicate detection, repo merging, and review selections.

use std::collections::{BTreeSet, HashMap, HashSet};

use cultureseg_shared::Segment;

/// Titles that occur more than once in the batch (exact, case-sensitive).
pub fn find_duplicate_titles(segments: &[Segment]) -> BTreeSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for seg in segments {
        *counts.entry(seg.title.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(title, _)| title.to_string())
        .collect()
}

/// Append `new_rows` to `existing_rows`, dropping exact duplicates.
///
/// A row is a duplicate only when every field matches a row already kept, so
/// two segments sharing a title but differing anywhere else both survive.
/// The first occurrence wins; existing rows keep their order and position.
pub fn merge_into_repo(existing_rows: &[Segment], new_rows: &[Segment]) -> Vec<Segment> {
    let mut seen: HashSet<&Segment> = HashSet::with_capacity(existing_rows.len() + new_rows.len());
    let mut merged = Vec::with_capacity(existing_rows.len() + new_rows.len());

    for row in existing_rows.iter().chain(new_rows) {
        if seen.insert(row) {
            merged.push(row.clone());
        }
    }

    merged
}

/// Segments whose title or content contains `query` (case-insensitive).
/// An empty query selects everything.
pub fn filter_segments<'s>(segments: &'s [Segment], query: &str) -> Vec<&'s Segment> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return segments.iter().collect();
    }
    segments
        .iter()
        .filter(|s| {
            s.title.to_lowercase().contains(&query) || s.content.to_lowercase().contains(&query)
        })
        .collect()
}

/// Segments flagged for human review.
pub fn flagged_segments(segments: &[Segment]) -> Vec<&Segment> {
    segments
        .iter()
        .filter(|s| s.needs_attention == Some(true))
        .collect()
}
