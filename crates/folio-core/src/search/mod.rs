//! Hybrid retrieval: embedding index, BM25 lexical index and score fusion.
//!
//! # Architecture
//!
//! - `types`: fragments, parsed units, ids and ranked results
//! - `vector`: cosine similarity search (exact scan, HNSW for large indexes)
//! - `embedding_index`: persistent vectors on top of `vector`
//! - `keyword`: BM25 over all fragment texts, rebuilt on every corpus change
//! - `fusion`: min-max (or rank) normalization and weighted merge
//! - `retriever`: runs both searches and hydrates fused results
//!
//! # Algorithm Details
//!
//! **Vector search**: cosine similarity, ties broken by insertion order.
//! Below `exact_search_threshold` vectors every stored vector is scored; above
//! it HNSW proposes candidates that are re-scored exactly.
//!
//! **Keyword search (BM25)**: language-aware tokenizer (stop words and
//! stemming) shared by indexing and querying, k1=1.2, b=0.75. Fragments
//! without any query term are not returned.
//!
//! **Fusion**: each list is normalized to [0, 1] independently, weighted
//! (0.5 / 0.5 by default) and summed per fragment. Ties go to the smaller
//! rank-sum, then to the earlier fragment.

pub mod embedding_index;
pub mod fusion;
pub mod keyword;
pub mod retriever;
pub mod types;
pub mod vector;

pub use embedding_index::{EmbeddingIndex, PreparedBatch};
pub use fusion::{fuse, normalize, FusedResult, FusionWeights};
pub use keyword::LexicalIndex;
pub use retriever::{FusionRetriever, RetrievedFragment};
pub use types::{
    validate_dimension, DocumentFormat, Fragment, FragmentId, Locator, ParsedUnit, RankedResult,
    UnitMetadata,
};
pub use vector::VectorSearchEngine;
