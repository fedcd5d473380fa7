//! Production configuration.
//!
//! Constants define the production defaults; [`EngineConfig`] carries them
//! (or overrides read by the front-end) into
//! [`KnowledgeBase::open`](crate::engine::KnowledgeBase::open).
//!
//! # Usage
//!
//! ```
//! use folio_core::config::{EngineConfig, CHUNK_SIZE, TOP_K};
//!
//! let config = EngineConfig::new("./data");
//! assert_eq!(config.chunk_size, CHUNK_SIZE);
//! assert_eq!(config.top_k, TOP_K);
//! ```

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Chunking
// =============================================================================

/// Maximum fragment length in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Characters repeated at the start of the next fragment.
///
/// Must stay strictly below [`CHUNK_SIZE`].
pub const CHUNK_OVERLAP: usize = 200;

// =============================================================================
// Retrieval
// =============================================================================

/// Fragments returned per query.
pub const TOP_K: usize = 3;

/// Weight of the embedding ranking in fusion.
pub const EMBEDDING_WEIGHT: f32 = 0.5;

/// Weight of the lexical ranking in fusion.
pub const LEXICAL_WEIGHT: f32 = 0.5;

/// Index size above which vector search uses HNSW candidates instead of an
/// exact scan.
pub const EXACT_SEARCH_THRESHOLD: usize = 10_000;

// =============================================================================
// Providers
// =============================================================================

/// Upper bound on any single provider call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Texts per embedding request.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Default embedding model (384-dimensional).
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "qwen/qwen3-235b-a22b:free";

// =============================================================================
// Persistence
// =============================================================================

/// Fragment snapshot file inside the data directory.
pub const FRAGMENTS_FILE: &str = "fragments.json";

/// Embedding index database inside the data directory.
pub const EMBEDDINGS_FILE: &str = "embeddings.redb";

/// How the fusion retriever maps raw scores into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// `(s - min) / (max - min)` within each list; a constant list maps to 1.0
    #[default]
    MinMax,
    /// Reciprocal-rank curve scaled so rank 1 maps to 1.0
    Rank,
}

/// Corpus language: tokenizer of the lexical index (stop-words and
/// stemming) and the words used in citation labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LexicalLanguage {
    #[default]
    English,
    Russian,
}

impl LexicalLanguage {
    /// Word for a PDF page in citation labels.
    pub fn page_word(self) -> &'static str {
        match self {
            LexicalLanguage::English => "page",
            LexicalLanguage::Russian => "страница",
        }
    }

    /// Word for an FB2 section in citation labels.
    pub fn section_word(self) -> &'static str {
        match self {
            LexicalLanguage::English => "section",
            LexicalLanguage::Russian => "раздел",
        }
    }
}

/// Runtime configuration of a [`KnowledgeBase`](crate::engine::KnowledgeBase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `fragments.json` and `embeddings.redb`
    pub data_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embedding_weight: f32,
    pub lexical_weight: f32,
    pub normalization: Normalization,
    pub lexical_language: LexicalLanguage,
    /// Provider call bound, in seconds
    #[serde(with = "duration_secs")]
    pub provider_timeout: Duration,
    pub exact_search_threshold: usize,
}

impl EngineConfig {
    /// Production defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Rejects combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(EngineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(EngineError::Config("top_k must be positive".into()));
        }
        for (name, weight) in [
            ("embedding_weight", self.embedding_weight),
            ("lexical_weight", self.lexical_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::Config(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        if self.embedding_weight + self.lexical_weight == 0.0 {
            return Err(EngineError::Config(
                "at least one fusion weight must be positive".into(),
            ));
        }
        if self.provider_timeout.is_zero() {
            return Err(EngineError::Config(
                "provider_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn fragments_path(&self) -> PathBuf {
        self.data_dir.join(FRAGMENTS_FILE)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.data_dir.join(EMBEDDINGS_FILE)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            top_k: TOP_K,
            embedding_weight: EMBEDDING_WEIGHT,
            lexical_weight: LEXICAL_WEIGHT,
            normalization: Normalization::default(),
            lexical_language: LexicalLanguage::default(),
            provider_timeout: PROVIDER_TIMEOUT,
            exact_search_threshold: EXACT_SEARCH_THRESHOLD,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
