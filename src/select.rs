//! Candidate selection: threshold, rank, optional dedup, cap.
//!
//! # Policy
//!
//! 1. Drop every candidate with `score <= relevance_threshold`.
//! 2. Sort survivors by score, descending. The sort is stable, so exact ties
//!    keep corpus order.
//! 3. If `dedup_similarity` is set, skip any survivor whose similarity to an
//!    already-kept candidate is at least that value.
//! 4. Truncate to `max_results`.
//!
//! An empty result is the "no relevant match" signal, not an error.

use crate::index::VectorIndex;

/// Selection tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectParams {
    /// Scores at or below this are noise from incidental shared n-grams.
    pub relevance_threshold: f64,
    /// Maximum number of selected documents.
    pub max_results: usize,
    /// Near-duplicate cutoff. `None` disables dedup.
    pub dedup_similarity: Option<f64>,
}

impl Default for SelectParams {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.1,
            max_results: 3,
            dedup_similarity: None,
        }
    }
}

/// Survivors of the threshold, best first.
fn rank(scores: &[(usize, f64)], threshold: f64) -> Vec<(usize, f64)> {
    let mut survivors: Vec<(usize, f64)> = scores
        .iter()
        .copied()
        .filter(|(_, s)| *s > threshold)
        .collect();
    survivors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    survivors
}

/// Select document positions from `scores`, best first.
///
/// Ignores `dedup_similarity`; use [`select_distinct`] when an index is at
/// hand.
pub fn select(scores: &[(usize, f64)], params: &SelectParams) -> Vec<usize> {
    rank(scores, params.relevance_threshold)
        .into_iter()
        .take(params.max_results)
        .map(|(pos, _)| pos)
        .collect()
}

/// Like [`select`], additionally applying near-duplicate suppression using
/// row similarities from `index`.
pub fn select_distinct(
    scores: &[(usize, f64)],
    params: &SelectParams,
    index: &VectorIndex,
) -> Vec<usize> {
    let Some(cutoff) = params.dedup_similarity else {
        return select(scores, params);
    };

    let mut kept: Vec<usize> = Vec::with_capacity(params.max_results);
    for (pos, _) in rank(scores, params.relevance_threshold) {
        if kept.len() >= params.max_results {
            break;
        }
        if kept.iter().any(|&k| index.similarity(k, pos) >= cutoff) {
            continue;
        }
        kept.push(pos);
    }
    kept
}
