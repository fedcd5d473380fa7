// Weighted score fusion of the embedding and lexical rankings

use super::types::{FragmentId, RankedResult};
use crate::config::Normalization;
use std::collections::HashMap;

/// Standard RRF k parameter value from academic literature.
///
/// Used by [`Normalization::Rank`]: a result at 1-based rank `r` normalizes to
/// `(RRF_K + 1) / (RRF_K + r)`, which is 1.0 at rank 1 and decays slowly.
pub const RRF_K: usize = 60;

/// Fixed pair of fusion weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub embedding: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            embedding: crate::config::EMBEDDING_WEIGHT,
            lexical: crate::config::LEXICAL_WEIGHT,
        }
    }
}

/// One entry of the merged ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub fragment_id: FragmentId,
    pub ordinal: usize,
    /// Weighted sum of the normalized scores
    pub score: f32,
    /// Raw cosine similarity, if the fragment was in the embedding list
    pub vector_score: Option<f32>,
    /// Raw BM25 score, if the fragment was in the lexical list
    pub lexical_score: Option<f32>,
    /// Sum of 1-based ranks; a missing rank counts as `k + 1`
    pub rank_sum: usize,
}

/// Maps a ranked list's scores into [0, 1], preserving order.
///
/// Min-max: a list whose scores are all equal maps to 1.0.
pub fn normalize(results: &[RankedResult], normalization: Normalization) -> Vec<f32> {
    match normalization {
        Normalization::MinMax => {
            let (min, max) = results
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), r| {
                    (lo.min(r.score), hi.max(r.score))
                });
            let range = max - min;
            results
                .iter()
                .map(|r| {
                    if range > f32::EPSILON {
                        (r.score - min) / range
                    } else {
                        1.0
                    }
                })
                .collect()
        }
        Normalization::Rank => (0..results.len())
            .map(|rank| (RRF_K + 1) as f32 / (RRF_K + rank + 1) as f32)
            .collect(),
    }
}

struct Entry {
    fragment_id: FragmentId,
    ordinal: usize,
    score: f32,
    vector_score: Option<f32>,
    lexical_score: Option<f32>,
    vector_rank: Option<usize>,
    lexical_rank: Option<usize>,
}

/// Merges two ranked lists into the top `k` fragments.
///
/// Each list is normalized independently and weighted; fragments in both
/// lists sum their contributions. Ordering: combined score descending, then
/// smaller rank-sum, then insertion order.
pub fn fuse(
    vector_results: &[RankedResult],
    lexical_results: &[RankedResult],
    k: usize,
    weights: FusionWeights,
    normalization: Normalization,
) -> Vec<FusedResult> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut positions: HashMap<FragmentId, usize> = HashMap::new();

    let vector_norm = normalize(vector_results, normalization);
    for (rank, (result, norm)) in vector_results.iter().zip(vector_norm).enumerate() {
        let pos = *positions
            .entry(result.fragment_id.clone())
            .or_insert_with(|| {
                entries.push(Entry::new(result));
                entries.len() - 1
            });
        let entry = &mut entries[pos];
        if entry.vector_rank.is_none() {
            entry.score += weights.embedding * norm;
            entry.vector_score = Some(result.score);
            entry.vector_rank = Some(rank + 1);
        }
    }

    let lexical_norm = normalize(lexical_results, normalization);
    for (rank, (result, norm)) in lexical_results.iter().zip(lexical_norm).enumerate() {
        let pos = *positions
            .entry(result.fragment_id.clone())
            .or_insert_with(|| {
                entries.push(Entry::new(result));
                entries.len() - 1
            });
        let entry = &mut entries[pos];
        if entry.lexical_rank.is_none() {
            entry.score += weights.lexical * norm;
            entry.lexical_score = Some(result.score);
            entry.lexical_rank = Some(rank + 1);
        }
    }

    let missing = k + 1;
    let mut fused: Vec<FusedResult> = entries
        .into_iter()
        .map(|e| FusedResult {
            rank_sum: e.vector_rank.unwrap_or(missing) + e.lexical_rank.unwrap_or(missing),
            fragment_id: e.fragment_id,
            ordinal: e.ordinal,
            score: e.score,
            vector_score: e.vector_score,
            lexical_score: e.lexical_score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.rank_sum.cmp(&b.rank_sum))
            .then(a.ordinal.cmp(&b.ordinal))
    });
    fused.truncate(k);
    fused
}

impl Entry {
    fn new(result: &RankedResult) -> Self {
        Self {
            fragment_id: result.fragment_id.clone(),
            ordinal: result.ordinal,
            score: 0.0,
            vector_score: None,
            lexical_score: None,
            vector_rank: None,
            lexical_rank: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(items: &[(usize, f32)]) -> Vec<RankedResult> {
        items
            .iter()
            .map(|&(ordinal, score)| RankedResult {
                fragment_id: FragmentId::from_string(format!("f{}", ordinal)),
                score,
                ordinal,
            })
            .collect()
    }

    fn ordinals(results: &[FusedResult]) -> Vec<usize> {
        results.iter().map(|r| r.ordinal).collect()
    }

    #[test]
    fn test_fragments_in_both_lists_win() {
        let vector = ranked(&[(1, 0.9), (2, 0.8), (3, 0.7)]);
        let lexical = ranked(&[(3, 10.0), (1, 8.0), (4, 5.0)]);

        let fused = fuse(
            &vector,
            &lexical,
            3,
            FusionWeights::default(),
            Normalization::MinMax,
        );

        assert_eq!(fused.len(), 3);
        // f1: 0.5*1.0 + 0.5*0.6 = 0.8; f3: 0.5*0.0 + 0.5*1.0 = 0.5; f2: 0.25
        assert_eq!(ordinals(&fused), vec![1, 3, 2]);
        assert!((fused[0].score - 0.8).abs() < 1e-6);
        assert_eq!(fused[0].vector_score, Some(0.9));
        assert_eq!(fused[0].lexical_score, Some(8.0));
    }

    #[test]
    fn test_single_list_uses_its_weighted_score() {
        let vector = ranked(&[(0, 0.9), (1, 0.1)]);
        let fused = fuse(
            &vector,
            &[],
            2,
            FusionWeights::default(),
            Normalization::MinMax,
        );
        assert_eq!(ordinals(&fused), vec![0, 1]);
        assert!((fused[0].score - 0.5).abs() < 1e-6);
        assert!(fused[1].score.abs() < 1e-6);
        assert_eq!(fused[1].lexical_score, None);
    }

    #[test]
    fn test_tie_breaks_by_rank_sum_then_insertion_order() {
        // f5 and f2 each appear once at rank 1 and score identically.
        let vector = ranked(&[(5, 0.7)]);
        let lexical = ranked(&[(2, 3.0)]);
        let fused = fuse(
            &vector,
            &lexical,
            2,
            FusionWeights::default(),
            Normalization::MinMax,
        );
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(fused[0].rank_sum, fused[1].rank_sum);
        assert_eq!(ordinals(&fused), vec![2, 5]);
    }

    #[test]
    fn test_rank_sum_breaks_score_ties() {
        // Constant lists normalize to 1.0, so every fragment scores 0.5 alone
        // and 1.0 in both lists.
        let vector = ranked(&[(0, 0.5), (1, 0.5)]);
        let lexical = ranked(&[(1, 2.0), (0, 2.0)]);
        let fused = fuse(
            &vector,
            &lexical,
            2,
            FusionWeights::default(),
            Normalization::MinMax,
        );
        assert_eq!(fused[0].rank_sum, 3);
        assert_eq!(fused[1].rank_sum, 3);
        assert_eq!(ordinals(&fused), vec![0, 1]);

        let vector = ranked(&[(4, 0.5), (3, 0.5)]);
        let lexical = ranked(&[(4, 2.0)]);
        let fused = fuse(
            &vector,
            &lexical,
            2,
            FusionWeights {
                embedding: 1.0,
                lexical: 0.0,
            },
            Normalization::MinMax,
        );
        assert_eq!(fused[0].score, fused[1].score);
        // f4: 1 + 1, f3: 2 + (k + 1)
        assert_eq!(fused[0].rank_sum, 2);
        assert_eq!(fused[1].rank_sum, 5);
        assert_eq!(ordinals(&fused), vec![4, 3]);
    }

    #[test]
    fn test_truncates_to_k() {
        let vector = ranked(&[(0, 0.9), (1, 0.8), (2, 0.7)]);
        let lexical = ranked(&[(3, 3.0), (4, 2.0), (5, 1.0)]);
        let fused = fuse(
            &vector,
            &lexical,
            3,
            FusionWeights::default(),
            Normalization::MinMax,
        );
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_both_empty() {
        let fused = fuse(&[], &[], 3, FusionWeights::default(), Normalization::MinMax);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_min_max_normalization() {
        let norm = normalize(&ranked(&[(0, 4.0), (1, 3.0), (2, 2.0)]), Normalization::MinMax);
        assert_eq!(norm, vec![1.0, 0.5, 0.0]);
        let constant = normalize(&ranked(&[(0, 0.3), (1, 0.3)]), Normalization::MinMax);
        assert_eq!(constant, vec![1.0, 1.0]);
    }

    #[test]
    fn test_rank_normalization() {
        let norm = normalize(&ranked(&[(0, 9.0), (1, 1.0)]), Normalization::Rank);
        assert_eq!(norm[0], 1.0);
        assert!((norm[1] - 61.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_normalization_orders_like_rrf() {
        let vector = ranked(&[(1, 0.9), (2, 0.8), (3, 0.7)]);
        let lexical = ranked(&[(3, 10.0), (1, 8.0), (4, 5.0)]);
        let fused = fuse(
            &vector,
            &lexical,
            4,
            FusionWeights::default(),
            Normalization::Rank,
        );
        let top: Vec<usize> = ordinals(&fused)[..2].to_vec();
        assert!(top.contains(&1));
        assert!(top.contains(&3));
    }
}
