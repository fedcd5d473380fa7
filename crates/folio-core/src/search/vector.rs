// rust-cv/hnsw nearest-neighbour search with exact re-scoring

use super::types::{by_score_then_ordinal, validate_dimension, FragmentId, RankedResult};
use crate::error::IndexError;
use hnsw::{Hnsw, Searcher};
use space::{Metric, Neighbor};
use tracing::{debug, instrument};

/// Minimum ef_search parameter for HNSW queries.
///
/// We use max(k * 2, MIN_EF_SEARCH) to scale with result count while keeping
/// a floor on candidate quality.
const MIN_EF_SEARCH: usize = 50;

/// Cosine distance metric for embedding vectors.
///
/// Computes 1 - cosine_similarity, scaled from [0, 2] to u32.
struct CosineDistance;

impl Metric<Box<[f32]>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        let similarity = cosine_similarity(a, b);
        if similarity.is_nan() {
            return u32::MAX;
        }
        let distance = (1.0 - similarity).clamp(0.0, 2.0);
        (distance * (u32::MAX as f32 / 2.0)) as u32
    }
}

/// Cosine similarity in [-1, 1]; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// In-memory vector index over fragment embeddings.
///
/// Below `exact_threshold` entries every query is an exact scan. Above it the
/// HNSW graph proposes candidates and those are re-scored exactly, so the
/// returned scores are always true cosine similarities and ties always break
/// by insertion order.
///
/// # HNSW Parameters
///
/// - **M = 16**: bidirectional links per node at layers > 0
/// - **M0 = 32**: links at layer 0 (2*M)
pub struct VectorSearchEngine {
    index: Hnsw<CosineDistance, Box<[f32]>, rand::rngs::StdRng, 16, 32>,
    /// Searcher reused across inserts
    searcher: Searcher<u32>,
    /// Fragment ids and vectors, by insertion position
    entries: Vec<(FragmentId, Box<[f32]>)>,
    dimension: usize,
    exact_threshold: usize,
}

impl VectorSearchEngine {
    pub fn new(dimension: usize, exact_threshold: usize) -> Self {
        Self {
            index: Hnsw::new(CosineDistance),
            searcher: Searcher::default(),
            entries: Vec::new(),
            dimension,
            exact_threshold,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates fragment ids in insertion order.
    pub fn fragment_ids(&self) -> impl Iterator<Item = &FragmentId> {
        self.entries.iter().map(|(id, _)| id)
    }

    /// Adds one embedding at the next insertion position.
    ///
    /// # Errors
    ///
    /// `IndexError::DimensionMismatch` if the vector has the wrong dimension.
    pub fn add(&mut self, fragment_id: FragmentId, embedding: Vec<f32>) -> Result<(), IndexError> {
        validate_dimension(self.dimension, embedding.len())?;

        let boxed = embedding.into_boxed_slice();
        self.index.insert(boxed.clone(), &mut self.searcher);
        self.entries.push((fragment_id, boxed));
        Ok(())
    }

    /// Returns up to `k` entries by descending cosine similarity.
    ///
    /// `ordinal` in each result is the entry's insertion position.
    #[instrument(skip_all, fields(index_size = self.entries.len(), k))]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RankedResult>, IndexError> {
        validate_dimension(self.dimension, query.len())?;

        if self.entries.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let candidates: Vec<usize> = if self.entries.len() <= self.exact_threshold {
            (0..self.entries.len()).collect()
        } else {
            self.hnsw_candidates(query, k)
        };

        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .map(|ordinal| {
                let (id, vector) = &self.entries[ordinal];
                RankedResult {
                    fragment_id: id.clone(),
                    score: cosine_similarity(query, vector),
                    ordinal,
                }
            })
            .collect();

        results.sort_by(by_score_then_ordinal);
        results.truncate(k);
        Ok(results)
    }

    fn hnsw_candidates(&self, query: &[f32], k: usize) -> Vec<usize> {
        let ef_search = std::cmp::max(k * 2, MIN_EF_SEARCH);
        let wanted = std::cmp::min(ef_search, self.entries.len());
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0
            };
            wanted
        ];

        let query_box: Box<[f32]> = query.to_vec().into_boxed_slice();
        let mut searcher = Searcher::default();
        let found = self
            .index
            .nearest(&query_box, ef_search, &mut searcher, &mut neighbors);

        let candidates: Vec<usize> = found
            .iter()
            .map(|n| n.index)
            .filter(|&index| index < self.entries.len())
            .collect();
        debug!("HNSW proposed {} candidates", candidates.len());
        candidates
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        *self = Self::new(self.dimension, self.exact_threshold);
    }
}
