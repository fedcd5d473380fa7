//! The [`KnowledgeBase`] facade: ingestion, hybrid retrieval, answer
//! synthesis and corpus reset over one corpus generation.
//!
//! One generation (corpus store, lexical index, embedding index) lives behind
//! a reader/writer lock. Writers (`ingest`, `reset_corpus`, `reindex`) hold the
//! write lock for their whole duration, including the embedding call, so
//! there is never more than one writer. Retrieval shares the read lock; the
//! generation call of `answer_query` runs after the lock is released.

pub mod answer;


use crate::chunking::Chunker;
use crate::config::EngineConfig;
use crate::error::{EngineError, HaltReason, IndexError};
use crate::parsing::parse_file;
use crate::providers::{with_timeout, EmbeddingProvider, GenerationProvider};
use crate::search::{
    EmbeddingIndex, Fragment, FragmentId, FusionRetriever, LexicalIndex, ParsedUnit, RetrievedFragment,
};
use crate::storage::{CorpusStore, EmbeddingStore, RedbEmbeddingStore, StoreError};
use answer::{build_prompt, source_labels};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a successful [`KnowledgeBase::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Fragments added to the corpus
    pub fragment_count: usize,
    /// Fragments skipped because the corpus already held them
    pub duplicate_count: usize,
    /// Stored fragments that had no vector and were embedded by this call
    pub restored_count: usize,
    /// Generation number after the call
    pub generation: u64,
}

/// Result of [`KnowledgeBase::answer_query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Fragments used as context, best first
    pub fragments: Vec<RetrievedFragment>,
    pub synthesized_answer: String,
    /// Citation labels, deduplicated in first-seen order
    pub source_labels: Vec<String>,
}

/// Snapshot of the engine's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub fragment_count: usize,
    pub embedding_count: usize,
    pub generation: u64,
    pub halted: Option<HaltReason>,
    pub embedding_model: String,
    /// Model recorded in the stored index, if any
    pub stored_model: Option<String>,
    pub data_dir: PathBuf,
}

struct Generation {
    number: u64,
    store: CorpusStore,
    lexical: LexicalIndex,
    embedding: EmbeddingIndex,
    halted: Option<HaltReason>,
}

pub struct KnowledgeBase {
    config: EngineConfig,
    chunker: Chunker,
    retriever: FusionRetriever,
    generator: Arc<dyn GenerationProvider>,
    state: RwLock<Generation>,
}

impl KnowledgeBase {
    /// Opens (or creates) the knowledge base in `config.data_dir`, storing
    /// embeddings in `embeddings.redb`.
    pub async fn open(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(StoreError::from)?;
        let store = RedbEmbeddingStore::open(config.embeddings_path())?;
        Self::open_with_store(config, Box::new(store), embedder, generator).await
    }

    /// Opens the knowledge base with a caller-supplied embedding store.
    ///
    /// The fragment snapshot is always `fragments.json` in `config.data_dir`.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub async fn open_with_store(
        config: EngineConfig,
        embedding_store: Box<dyn EmbeddingStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let store = CorpusStore::open(config.fragments_path()).await?;
        let embedding = EmbeddingIndex::open(
            embedding_store,
            embedder,
            config.exact_search_threshold,
            config.provider_timeout,
        )
        .await?;

        let mut lexical = LexicalIndex::new(config.lexical_language);
        lexical.rebuild(store.all());

        let halted = check_consistency(&store, &embedding);
        if let Some(reason) = &halted {
            error!("Writes halted on open: {}", reason);
        }

        info!(
            "Opened knowledge base: {} fragments, {} embeddings",
            store.len(),
            embedding.len()
        );

        Ok(Self {
            retriever: FusionRetriever::from_config(&config),
            config,
            chunker,
            generator,
            state: RwLock::new(Generation {
                number: 1,
                store,
                lexical,
                embedding,
                halted,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses one document by extension and ingests it.
    pub async fn ingest_file(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestReport, EngineError> {
        let units = parse_file(filename, bytes)?;
        self.ingest(&units).await
    }

    /// Chunks, embeds and indexes parsed units.
    ///
    /// Fragments whose id is already in the corpus are not stored again.
    /// Corpus fragments that have no vector (for example after the embedding
    /// file was lost) are embedded together with the new ones, so the
    /// embedding index always covers the whole corpus afterwards. On any
    /// failure the corpus store and both indexes are left as they were.
    ///
    /// # Errors
    ///
    /// - `WritesHalted` if an earlier failure left the indexes inconsistent
    /// - `NoExtractableText` if chunking produced no fragments
    /// - `EmbeddingProvider` if the provider failed (nothing is persisted)
    /// - `DimensionMismatch` if the provider changed dimension; this halts
    ///   further writes until `reindex` or `reset_corpus`
    #[instrument(skip_all, fields(units = units.len()))]
    pub async fn ingest(&self, units: &[ParsedUnit]) -> Result<IngestReport, EngineError> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.halted {
            return Err(EngineError::WritesHalted(reason.clone()));
        }

        let fragments = self.chunker.split(units);
        if fragments.is_empty() {
            return Err(EngineError::NoExtractableText);
        }

        let total = fragments.len();
        let mut seen = HashSet::new();
        let fresh: Vec<Fragment> = fragments
            .into_iter()
            .filter(|f| !state.store.contains(&f.id) && seen.insert(f.id.clone()))
            .collect();
        let duplicate_count = total - fresh.len();

        let embedded: HashSet<FragmentId> = state.embedding.fragment_ids().into_iter().collect();
        let unembedded: Vec<Fragment> = state
            .store
            .all()
            .iter()
            .filter(|f| !embedded.contains(&f.id))
            .cloned()
            .collect();
        let restored_count = unembedded.len();

        if fresh.is_empty() && unembedded.is_empty() {
            info!("All {} fragments already indexed", total);
            return Ok(IngestReport {
                fragment_count: 0,
                duplicate_count,
                restored_count: 0,
                generation: state.number,
            });
        }
        if restored_count > 0 {
            info!("Embedding {} stored fragments that had no vectors", restored_count);
        }

        let mut to_embed = unembedded;
        to_embed.extend(fresh.iter().cloned());
        let prepared = state.embedding.prepare(&to_embed).await;
        let batch = match prepared {
            Ok(batch) => batch,
            Err(IndexError::DimensionMismatch { expected, actual }) => {
                warn!(
                    "Provider returned dimension {} for an index of dimension {}; halting writes",
                    actual, expected
                );
                state.halted = Some(HaltReason::DimensionMismatch { expected, actual });
                return Err(EngineError::DimensionMismatch { expected, actual });
            }
            Err(e) => return Err(e.into()),
        };

        let fragment_count = fresh.len();
        let previous_len = state.store.len();
        if !fresh.is_empty() {
            state.store.append(fresh).await?;
        }

        let committed = state.embedding.commit(batch).await;
        if let Err(e) = committed {
            let rolled_back = state.store.truncate(previous_len).await;
            if let Err(rollback) = rolled_back {
                error!("Failed to roll back corpus after index error: {}", rollback);
                state.halted = Some(HaltReason::Diverged(format!(
                    "corpus holds fragments without embeddings: {}",
                    rollback
                )));
            }
            return Err(e.into());
        }

        let generation = &mut *state;
        generation.lexical.rebuild(generation.store.all());
        generation.number += 1;

        info!(
            "Ingested {} fragments ({} duplicates, {} restored), generation {}",
            fragment_count, duplicate_count, restored_count, generation.number
        );

        Ok(IngestReport {
            fragment_count,
            duplicate_count,
            restored_count,
            generation: generation.number,
        })
    }

    /// Hybrid retrieval of the top `k` fragments for `query`.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a blank query or `k == 0`; `RetrieverUnavailable`
    /// when either index cannot serve.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedFragment>, EngineError> {
        validate_query(query, k)?;
        let state = self.state.read().await;
        let results = self
            .retriever
            .retrieve(query, k, &state.embedding, &state.lexical, &state.store)
            .await?;
        Ok(results)
    }

    /// Retrieves `top_k` fragments and asks the generation provider for an
    /// answer grounded in them.
    ///
    /// # Errors
    ///
    /// `EmptyCorpus` before anything was ingested, `RetrieverUnavailable`
    /// when an index cannot serve, `GenerationProvider` when generation fails.
    #[instrument(skip_all)]
    pub async fn answer_query(&self, query: &str) -> Result<Answer, EngineError> {
        validate_query(query, self.config.top_k)?;

        let fragments = {
            let state = self.state.read().await;
            if state.store.is_empty() {
                return Err(EngineError::EmptyCorpus);
            }
            self.retriever
                .retrieve(
                    query,
                    self.config.top_k,
                    &state.embedding,
                    &state.lexical,
                    &state.store,
                )
                .await?
        };
        debug!("Retrieved {} fragments for answer", fragments.len());

        let contexts: Vec<&str> = fragments.iter().map(|r| r.fragment.text.as_str()).collect();
        let prompt = build_prompt(query, &contexts);
        let synthesized_answer =
            with_timeout(self.config.provider_timeout, self.generator.complete(&prompt))
                .await
                .map_err(EngineError::GenerationProvider)?;

        let cited: Vec<Fragment> = fragments.iter().map(|r| r.fragment.clone()).collect();
        Ok(Answer {
            source_labels: source_labels(&cited, self.config.lexical_language),
            fragments,
            synthesized_answer,
        })
    }

    /// Clears the corpus store, then the lexical and embedding indexes.
    ///
    /// # Errors
    ///
    /// `PartialReset` when the store was cleared but the embedding index was
    /// not; writes stay halted until a reset succeeds or `reindex` runs.
    #[instrument(skip_all)]
    pub async fn reset_corpus(&self) -> Result<(), EngineError> {
        let mut state = self.state.write().await;

        state.store.clear().await?;
        state.lexical.clear();
        state.number += 1;

        let cleared = state.embedding.clear().await;
        if let Err(e) = cleared {
            let reason = format!("embedding index failed to clear: {}", e);
            error!("{}", reason);
            state.halted = Some(HaltReason::PartialReset(reason.clone()));
            return Err(EngineError::PartialReset(reason));
        }

        state.halted = None;
        info!("Corpus reset, generation {}", state.number);
        Ok(())
    }

    /// Re-embeds every corpus fragment into a fresh embedding index and
    /// lifts any write halt. Returns the number of fragments embedded.
    ///
    /// The previous vectors are kept if embedding fails. If storing the new
    /// vectors fails after the old ones were cleared, writes halt with
    /// `Diverged` until a later `reindex` or `reset_corpus` succeeds.
    #[instrument(skip_all)]
    pub async fn reindex(&self) -> Result<usize, EngineError> {
        let mut state = self.state.write().await;
        let fragments = state.store.all().to_vec();

        let batch = state.embedding.prepare_rebuild(&fragments).await?;
        state.embedding.clear().await?;
        let committed = state.embedding.commit(batch).await;
        if let Err(e) = committed {
            let reason = format!("embedding index cleared but rebuild failed: {}", e);
            error!("{}", reason);
            state.halted = Some(HaltReason::Diverged(reason));
            state.number += 1;
            return Err(e.into());
        }

        let generation = &mut *state;
        generation.lexical.rebuild(generation.store.all());
        if let Some(reason) = generation.halted.take() {
            info!("Reindex lifted write halt: {}", reason);
        }
        generation.number += 1;

        info!(
            "Reindexed {} fragments, generation {}",
            fragments.len(),
            generation.number
        );
        Ok(fragments.len())
    }

    pub async fn status(&self) -> Status {
        let state = self.state.read().await;
        Status {
            fragment_count: state.store.len(),
            embedding_count: state.embedding.len(),
            generation: state.number,
            halted: state.halted.clone(),
            embedding_model: state.embedding.provider_model_id().to_string(),
            stored_model: state.embedding.stored_model_id().map(str::to_string),
            data_dir: self.config.data_dir.clone(),
        }
    }
}

fn validate_query(query: &str, k: usize) -> Result<(), EngineError> {
    if query.trim().is_empty() {
        return Err(EngineError::InvalidQuery("query is empty".into()));
    }
    if k == 0 {
        return Err(EngineError::InvalidQuery("k must be positive".into()));
    }
    Ok(())
}

/// Compares persisted embeddings with the fragment snapshot.
///
/// Every stored vector must have the index dimension, belong to a snapshot
/// fragment at most once, and come from the configured model. The snapshot
/// may hold fragments without vectors; the next `ingest` or `reindex` embeds
/// them, and until then retrieval reports `NotInitialized` if there are no
/// vectors at all.
fn check_consistency(store: &CorpusStore, embedding: &EmbeddingIndex) -> Option<HaltReason> {
    if let Some((expected, actual)) = embedding.rejected_dimension() {
        return Some(HaltReason::DimensionMismatch { expected, actual });
    }

    if embedding.is_empty() {
        if !store.is_empty() {
            warn!(
                "{} fragments have no embeddings; run reindex or re-ingest to restore vector search",
                store.len()
            );
        }
        return None;
    }

    let ids = embedding.fragment_ids();
    let mut seen = HashSet::with_capacity(ids.len());
    let unknown = ids.iter().filter(|id| !store.contains(id)).count();
    let repeated = ids.iter().filter(|id| !seen.insert(*id)).count();
    if unknown > 0 || repeated > 0 {
        return Some(HaltReason::Diverged(format!(
            "{} stored vectors reference unknown fragments, {} are repeated",
            unknown, repeated
        )));
    }

    if let Some(stored) = embedding.stored_model_id() {
        let configured = embedding.provider_model_id();
        if stored != configured {
            return Some(HaltReason::ModelChanged {
                stored: stored.to_string(),
                configured: configured.to_string(),
            });
        }
    }

    if embedding.len() < store.len() {
        warn!(
            "{} of {} fragments have no embeddings; the next ingest embeds them",
            store.len() - embedding.len(),
            store.len()
        );
    }
    None
}
