//! Error types for folio-core.
//!
//! Component-level errors (chunking, parsing, providers, indexes, storage)
//! are collected into [`EngineError`], which is what the
//! [`KnowledgeBase`](crate::engine::KnowledgeBase) facade returns to the
//! front-end.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while configuring or running the chunker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Invalid chunk size / overlap combination
    #[error("Invalid chunking config: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the document parsers.
///
/// A parse error aborts ingestion of that one document; it never touches the
/// corpus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// File extension is not one of pdf / fb2 / txt
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// Document bytes are not valid UTF-8 where text was expected
    #[error("Invalid text encoding in {0}")]
    InvalidEncoding(String),
    /// Document is structurally broken
    #[error("Corrupt document {name}: {reason}")]
    Corrupt {
        /// Source file name
        name: String,
        /// Parser-specific failure description
        reason: String,
    },
}

/// Failure of a remote provider call (embedding or generation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or provider message
        message: String,
    },
    /// Connection, TLS or request construction failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Call did not complete within the configured bound
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// Provider answered 2xx with an unusable body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the persistent stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error on the data directory
    #[error("I/O error: {0}")]
    IoError(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// redb error
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err.to_string())
    }
}

/// Errors raised by the embedding and lexical indexes.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding index searched before any batch was added
    #[error("Embedding index not initialized")]
    NotInitialized,
    /// Lexical index searched with no fragments in the corpus
    #[error("Corpus is empty")]
    EmptyCorpus,
    /// Vector of unexpected dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the index
        expected: usize,
        /// Dimension received
        actual: usize,
    },
    /// Provider returned a different number of vectors than requested
    #[error("Provider returned {actual} vectors for {expected} texts")]
    VectorCountMismatch {
        /// Number of texts sent
        expected: usize,
        /// Number of vectors received
        actual: usize,
    },
    /// Embedding provider failed while computing vectors
    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Why the engine refuses further writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// A vector of the wrong dimension reached the embedding index
    DimensionMismatch {
        /// Dimension fixed by the index
        expected: usize,
        /// Dimension received
        actual: usize,
    },
    /// Corpus was cleared but an index failed to clear
    PartialReset(String),
    /// Persisted embeddings do not line up with the fragment snapshot
    Diverged(String),
    /// Persisted embeddings were produced by another model
    ModelChanged {
        /// Model recorded in the index manifest
        stored: String,
        /// Model of the configured provider
        configured: String,
    },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::DimensionMismatch { expected, actual } => write!(
                f,
                "embedding dimension mismatch (expected {}, got {})",
                expected, actual
            ),
            HaltReason::PartialReset(reason) => write!(f, "incomplete reset: {}", reason),
            HaltReason::Diverged(reason) => write!(f, "index diverged from corpus: {}", reason),
            HaltReason::ModelChanged { stored, configured } => write!(
                f,
                "index built with model '{}' but provider is '{}'",
                stored, configured
            ),
        }
    }
}

/// Coarse classification of an [`EngineError`] for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Preconditions not met: nothing has been ingested yet
    NothingToSearch,
    /// The caller's input was rejected
    BadInput,
    /// A remote provider failed; retrying the whole operation may help
    ProviderFailure,
    /// Internal inconsistency; operator action (reset / reindex) required
    SystemBroken,
}

/// Errors returned by the [`KnowledgeBase`](crate::engine::KnowledgeBase) facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Document could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Parsed document produced no fragments
    #[error("No extractable text in document")]
    NoExtractableText,
    /// Chunker rejected its configuration
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(ProviderError),
    /// Generation provider failed
    #[error("Generation provider error: {0}")]
    GenerationProvider(ProviderError),
    /// No fragments in the corpus
    #[error("Corpus is empty")]
    EmptyCorpus,
    /// One of the indexes cannot serve queries
    #[error("Retriever unavailable: {0}")]
    RetrieverUnavailable(#[source] IndexError),
    /// Vector of unexpected dimension; writes are halted
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the index
        expected: usize,
        /// Dimension received
        actual: usize,
    },
    /// Corpus cleared but an index failed to clear
    #[error("Partial reset: corpus cleared but {0}")]
    PartialReset(String),
    /// Writes refused until reset or reindex
    #[error("Writes halted: {0}")]
    WritesHalted(HaltReason),
    /// Query rejected before searching
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Classifies the error so front-ends can tell "no results" from
    /// "bad input" from "system broken".
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::EmptyCorpus | EngineError::RetrieverUnavailable(_) => {
                ErrorClass::NothingToSearch
            }
            EngineError::Parse(_)
            | EngineError::NoExtractableText
            | EngineError::InvalidQuery(_) => ErrorClass::BadInput,
            EngineError::EmbeddingProvider(_) | EngineError::GenerationProvider(_) => {
                ErrorClass::ProviderFailure
            }
            EngineError::Chunking(_)
            | EngineError::DimensionMismatch { .. }
            | EngineError::PartialReset(_)
            | EngineError::WritesHalted(_)
            | EngineError::Storage(_)
            | EngineError::Config(_) => ErrorClass::SystemBroken,
        }
    }
}

impl From<IndexError> for EngineError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotInitialized | IndexError::EmptyCorpus => {
                EngineError::RetrieverUnavailable(err)
            }
            IndexError::DimensionMismatch { expected, actual } => {
                EngineError::DimensionMismatch { expected, actual }
            }
            IndexError::VectorCountMismatch { expected, actual } => {
                EngineError::EmbeddingProvider(ProviderError::InvalidResponse(format!(
                    "{} vectors for {} texts",
                    actual, expected
                )))
            }
            IndexError::Provider(e) => EngineError::EmbeddingProvider(e),
            IndexError::Storage(e) => EngineError::Storage(e),
        }
    }
}
