//! Score normalization and hybrid blending.
//!
//! Lexical (BM25) and vector (cosine) scores live on unrelated scales, so
//! each channel is min-max normalized to `[0, 1]` before blending:
//!
//! ```text
//! hybrid = (1 - alpha) * keyword + alpha * vector
//! ```
//!
//! A candidate missing from one channel scores `0.0` there. Ties are broken
//! by ascending id so results are deterministic.

use std::collections::HashMap;

/// A raw candidate from one retrieval channel. Higher `raw_score` is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: u64,
    pub raw_score: f64,
}

/// Min-max normalize scores to `[0, 1]`.
///
/// A single candidate, or candidates that all share one score, normalize to `1.0`.
pub fn normalize_scores(candidates: &[Candidate]) -> Vec<(u64, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c.id, norm)
        })
        .collect()
}

/// Blend keyword and vector candidates, returning `(id, score)` sorted by
/// score descending and truncated to `limit`.
pub fn blend(
    keyword: &[Candidate],
    vector: &[Candidate],
    alpha: f64,
    limit: usize,
) -> Vec<(u64, f64)> {
    let kw_map: HashMap<u64, f64> = normalize_scores(keyword).into_iter().collect();
    let vec_map: HashMap<u64, f64> = normalize_scores(vector).into_iter().collect();

    let mut ids: Vec<u64> = kw_map.keys().chain(vec_map.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut scored: Vec<(u64, f64)> = ids
        .into_iter()
        .map(|id| {
            let k = kw_map.get(&id).copied().unwrap_or(0.0);
            let v = vec_map.get(&id).copied().unwrap_or(0.0);
            (id, (1.0 - alpha) * k + alpha * v)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}
