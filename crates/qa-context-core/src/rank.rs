//! Top-k cosine ranking over the embedding index.
//!
//! [`rank`] is an exact full scan: every row is scored, then the list is
//! sorted by score (desc) with ties broken by row index (asc) so fixtures
//! are reproducible. The [`Ranker`] trait is the seam for swapping in an
//! approximate index on large corpora without touching the rest of the
//! pipeline.

use std::cmp::Ordering;

use crate::error::Result;
use crate::index::EmbeddingIndex;

/// A single row hit: position in the index and its cosine score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub index: usize,
    pub score: f32,
}

/// Selects the `top_k` rows most similar to a query vector.
pub trait Ranker: Send + Sync {
    /// Returns `min(top_k, N)` rows ordered by descending score, ascending index on ties.
    fn rank(&self, query: &[f32], index: &EmbeddingIndex, top_k: usize) -> Result<Vec<ScoredRow>>;
}

/// Brute-force cosine ranker. Scores all `N` rows on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactCosineRanker;

impl Ranker for ExactCosineRanker {
    fn rank(&self, query: &[f32], index: &EmbeddingIndex, top_k: usize) -> Result<Vec<ScoredRow>> {
        rank(query, index, top_k)
    }
}

/// Exact top-k by cosine similarity.
///
/// `top_k` larger than the index is clamped to `N`. `top_k == 0` yields an
/// empty list; the assembler turns that into
/// [`EmptyResultSet`](crate::error::RetrievalError::EmptyResultSet).
///
/// # Errors
///
/// [`DimensionMismatch`](crate::error::RetrievalError::DimensionMismatch)
/// if `query.len()` differs from the index dimensionality.
pub fn rank(query: &[f32], index: &EmbeddingIndex, top_k: usize) -> Result<Vec<ScoredRow>> {
    let scores = index.cosine_all(query)?;
    let k = top_k.min(scores.len());

    let mut rows: Vec<ScoredRow> = scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| ScoredRow { index, score })
        .collect();

    if k < rows.len() {
        if k > 0 {
            rows.select_nth_unstable_by(k - 1, compare_rows);
        }
        rows.truncate(k);
    }
    rows.sort_by(compare_rows);

    Ok(rows)
}

/// Score descending, then index ascending.
fn compare_rows(a: &ScoredRow, b: &ScoredRow) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(a.index.cmp(&b.index))
}
