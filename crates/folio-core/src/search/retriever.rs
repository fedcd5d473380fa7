//! Hybrid retrieval over the embedding and lexical indexes.

use super::embedding_index::EmbeddingIndex;
use super::fusion::{fuse, FusionWeights};
use super::keyword::LexicalIndex;
use super::types::{Fragment, RankedResult};
use crate::config::{EngineConfig, Normalization};
use crate::error::IndexError;
use crate::storage::CorpusStore;
use serde::Serialize;
use tracing::{debug, instrument};

/// A fragment returned by [`FusionRetriever::retrieve`] with its scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedFragment {
    pub fragment: Fragment,
    /// Fused score in [0, embedding_weight + lexical_weight]
    pub score: f32,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Queries both indexes for `k` results each and fuses the rankings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionRetriever {
    weights: FusionWeights,
    normalization: Normalization,
}

impl FusionRetriever {
    pub fn new(weights: FusionWeights, normalization: Normalization) -> Self {
        Self {
            weights,
            normalization,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            FusionWeights {
                embedding: config.embedding_weight,
                lexical: config.lexical_weight,
            },
            config.normalization,
        )
    }

    /// Top `k` fragments of the current generation for `query`.
    ///
    /// Results are hydrated from `store`; an id the store does not hold is
    /// dropped.
    ///
    /// # Errors
    ///
    /// `EmptyCorpus` from the lexical index or `NotInitialized` from the
    /// embedding index when either cannot serve, plus provider failures of
    /// the query embedding.
    #[instrument(skip_all, fields(k))]
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        embedding: &EmbeddingIndex,
        lexical: &LexicalIndex,
        store: &CorpusStore,
    ) -> Result<Vec<RetrievedFragment>, IndexError> {
        if lexical.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        if embedding.is_empty() {
            return Err(IndexError::NotInitialized);
        }

        let lexical_results = lexical.search(query, k)?;

        // Embedding positions need not be corpus ordinals after a partial
        // recovery, so rank ties are resolved on the corpus position.
        let vector_results: Vec<RankedResult> = embedding
            .search_text(query, k)
            .await?
            .into_iter()
            .filter_map(|result| {
                store.ordinal_of(&result.fragment_id).map(|ordinal| RankedResult {
                    ordinal,
                    ..result
                })
            })
            .collect();

        debug!(
            "{} vector and {} lexical candidates",
            vector_results.len(),
            lexical_results.len()
        );

        let fused = fuse(
            &vector_results,
            &lexical_results,
            k,
            self.weights,
            self.normalization,
        );

        Ok(fused
            .into_iter()
            .filter_map(|result| {
                store.get(result.ordinal).map(|fragment| RetrievedFragment {
                    fragment: fragment.clone(),
                    score: result.score,
                    vector_score: result.vector_score,
                    lexical_score: result.lexical_score,
                })
            })
            .collect())
    }
}

impl Default for FusionRetriever {
    fn default() -> Self {
        Self::new(FusionWeights::default(), Normalization::default())
    }
}
