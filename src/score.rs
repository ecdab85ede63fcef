//! Query scoring against a built [`VectorIndex`].
//!
//! Pure and read-only: many queries may score the same index concurrently.

use crate::index::VectorIndex;

/// Score `query` against every row of `index`.
///
/// Returns one `(position, score)` pair per document, in corpus order.
/// Scores are cosine similarities in `[0.0, 1.0]`; a query whose projection
/// is all-zero (empty, or no shared n-grams) scores `0.0` everywhere.
pub fn score(query: &str, index: &VectorIndex) -> Vec<(usize, f64)> {
    let projected = index.project(query);
    if projected.is_zero() {
        return (0..index.len()).map(|pos| (pos, 0.0)).collect();
    }

    index
        .rows()
        .iter()
        .enumerate()
        .map(|(pos, row)| (pos, row.dot(&projected).clamp(0.0, 1.0)))
        .collect()
}
