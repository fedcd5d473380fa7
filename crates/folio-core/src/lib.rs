//! # Folio Core
//!
//! Hybrid retrieval-and-storage engine for document question answering.
//!
//! Documents are parsed into units, split into overlapping fragments, embedded
//! and indexed twice (cosine similarity over embeddings, BM25 over text).
//! Queries run against both indexes and the rankings are fused; the best
//! fragments become the context of a generated answer.
//!
//! ## Modules
//!
//! - [`engine`] - [`KnowledgeBase`] facade: ingest, retrieve, answer, reset
//! - [`search`] - embedding index, lexical index, fusion retriever
//! - [`storage`] - fragment snapshot and embedding persistence (redb)
//! - [`chunking`] - overlapping fragment splitter
//! - [`parsing`] - PDF, FB2 and plain-text parsers
//! - [`providers`] - embedding and generation provider traits, HTTP clients
//! - [`config`] - production constants and [`EngineConfig`]
//! - [`error`] - error types
//! - [`testing`] - deterministic offline providers

pub mod chunking;
pub mod config;
pub mod engine;
pub mod error;
pub mod parsing;
pub mod providers;
pub mod search;
pub mod storage;
pub mod testing;

pub use config::EngineConfig;
pub use engine::{Answer, IngestReport, KnowledgeBase, Status};
pub use error::{EngineError, ErrorClass, HaltReason};
pub use providers::{EmbeddingProvider, GenerationProvider};
pub use search::{DocumentFormat, Fragment, Locator, ParsedUnit, RetrievedFragment};
