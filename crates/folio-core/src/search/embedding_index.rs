//! Persistent embedding index.
//!
//! Vectors are computed by an [`EmbeddingProvider`], persisted through an
//! [`EmbeddingStore`] and searched in memory by a [`VectorSearchEngine`].
//!
//! Adding is split in two phases so that nothing reaches storage before every
//! vector has been computed and validated:
//!
//! 1. [`prepare`](EmbeddingIndex::prepare) calls the provider and checks the
//!    vector count and dimensions.
//! 2. [`commit`](EmbeddingIndex::commit) writes the batch in one storage
//!    transaction and only then inserts it into the in-memory index.

use super::types::{validate_dimension, Fragment, FragmentId, RankedResult};
use super::vector::VectorSearchEngine;
use crate::error::IndexError;
use crate::providers::{with_timeout, EmbeddingProvider};
use crate::storage::{EmbeddingStore, IndexManifest, StoredEmbedding};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Validated vectors waiting to be committed.
#[derive(Debug)]
pub struct PreparedBatch {
    rows: Vec<StoredEmbedding>,
    dimension: Option<usize>,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct EmbeddingIndex {
    /// `None` until the first batch fixes the dimension
    engine: Option<VectorSearchEngine>,
    store: Box<dyn EmbeddingStore>,
    provider: Arc<dyn EmbeddingProvider>,
    manifest: Option<IndexManifest>,
    exact_threshold: usize,
    timeout: Duration,
    /// `(manifest, row)` dimensions of stored vectors that could not be loaded
    rejected_dimension: Option<(usize, usize)>,
}

impl EmbeddingIndex {
    /// Loads every persisted vector into memory.
    ///
    /// Stored vectors whose dimension disagrees with the manifest are not
    /// loaded; the index opens empty and reports them through
    /// [`rejected_dimension`](Self::rejected_dimension).
    ///
    /// # Errors
    ///
    /// Storage failures.
    #[instrument(skip_all)]
    pub async fn open(
        store: Box<dyn EmbeddingStore>,
        provider: Arc<dyn EmbeddingProvider>,
        exact_threshold: usize,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let stored = store.load().await?;

        let mut index = Self {
            engine: None,
            store,
            provider,
            manifest: stored.manifest,
            exact_threshold,
            timeout,
            rejected_dimension: None,
        };

        if stored.rows.is_empty() {
            debug!("No stored embeddings");
            return Ok(index);
        }

        let dimension = match &index.manifest {
            Some(manifest) => manifest.dimension,
            None => {
                warn!("Stored embeddings have no manifest, taking dimension from first row");
                stored.rows[0].vector.len()
            }
        };

        if let Some(row) = stored.rows.iter().find(|r| r.vector.len() != dimension) {
            warn!(
                "Stored vector for {} has dimension {}, index has {}; not loading embeddings",
                row.fragment_id,
                row.vector.len(),
                dimension
            );
            index.rejected_dimension = Some((dimension, row.vector.len()));
            return Ok(index);
        }

        let mut engine = VectorSearchEngine::new(dimension, exact_threshold);
        for row in stored.rows {
            engine.add(row.fragment_id, row.vector)?;
        }
        info!(
            "Loaded {} embeddings (dimension {})",
            engine.len(),
            dimension
        );
        index.engine = Some(engine);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.engine.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.engine.as_ref().map(|e| e.dimension())
    }

    /// Model id recorded when the stored vectors were written.
    pub fn stored_model_id(&self) -> Option<&str> {
        self.manifest.as_ref().map(|m| m.model_id.as_str())
    }

    pub fn provider_model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Expected and actual dimension when stored vectors were left unloaded.
    pub fn rejected_dimension(&self) -> Option<(usize, usize)> {
        self.rejected_dimension
    }

    /// Fragment ids in insertion order.
    pub fn fragment_ids(&self) -> Vec<FragmentId> {
        self.engine
            .as_ref()
            .map(|e| e.fragment_ids().cloned().collect())
            .unwrap_or_default()
    }

    /// Computes and validates vectors for `fragments` against the current
    /// dimension. Nothing is persisted.
    pub async fn prepare(&self, fragments: &[Fragment]) -> Result<PreparedBatch, IndexError> {
        self.embed_fragments(fragments, self.dimension()).await
    }

    /// Like [`prepare`](Self::prepare) but ignores the current dimension, for
    /// a batch that will replace the whole index.
    pub async fn prepare_rebuild(
        &self,
        fragments: &[Fragment],
    ) -> Result<PreparedBatch, IndexError> {
        self.embed_fragments(fragments, None).await
    }

    #[instrument(skip_all, fields(fragments = fragments.len()))]
    async fn embed_fragments(
        &self,
        fragments: &[Fragment],
        expected_dimension: Option<usize>,
    ) -> Result<PreparedBatch, IndexError> {
        if fragments.is_empty() {
            return Ok(PreparedBatch {
                rows: Vec::new(),
                dimension: expected_dimension,
            });
        }

        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
        let batch_size = self.provider.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            vectors.extend(with_timeout(self.timeout, self.provider.embed(batch)).await?);
        }

        if vectors.len() != fragments.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: fragments.len(),
                actual: vectors.len(),
            });
        }

        let dimension = expected_dimension.unwrap_or(vectors[0].len());
        for vector in &vectors {
            validate_dimension(dimension, vector.len())?;
        }

        let rows = fragments
            .iter()
            .zip(vectors)
            .map(|(fragment, vector)| StoredEmbedding {
                fragment_id: fragment.id.clone(),
                vector,
            })
            .collect();

        Ok(PreparedBatch {
            rows,
            dimension: Some(dimension),
        })
    }

    /// Persists a prepared batch in one transaction, then indexes it.
    ///
    /// # Errors
    ///
    /// On storage failure the in-memory index is unchanged.
    #[instrument(skip_all, fields(rows = batch.rows.len()))]
    pub async fn commit(&mut self, batch: PreparedBatch) -> Result<(), IndexError> {
        let Some(dimension) = batch.dimension else {
            return Ok(());
        };
        if batch.rows.is_empty() {
            return Ok(());
        }
        if let Some(current) = self.dimension() {
            validate_dimension(current, dimension)?;
        }

        let start_seq = self.len();
        let model_id = self.provider.model_id().to_string();
        let manifest = IndexManifest {
            count: start_seq + batch.rows.len(),
            ..IndexManifest::new(dimension, model_id)
        };

        self.store
            .put_batch(start_seq as u64, &batch.rows, &manifest)
            .await?;

        let exact_threshold = self.exact_threshold;
        let engine = self
            .engine
            .get_or_insert_with(|| VectorSearchEngine::new(dimension, exact_threshold));
        for row in batch.rows {
            engine.add(row.fragment_id, row.vector)?;
        }
        self.manifest = Some(manifest);
        debug!("Embedding index now holds {} vectors", engine.len());
        Ok(())
    }

    /// Embeds and stores `fragments` as one batch.
    pub async fn add(&mut self, fragments: &[Fragment]) -> Result<(), IndexError> {
        let batch = self.prepare(fragments).await?;
        self.commit(batch).await
    }

    /// Top `k` fragments by cosine similarity to `query`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before any successful add; `DimensionMismatch` for a
    /// query of the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RankedResult>, IndexError> {
        match &self.engine {
            Some(engine) if !engine.is_empty() => engine.search(query, k),
            _ => Err(IndexError::NotInitialized),
        }
    }

    /// Embeds `query` with the index's provider, then searches.
    pub async fn search_text(&self, query: &str, k: usize) -> Result<Vec<RankedResult>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::NotInitialized);
        }
        let vector = with_timeout(self.timeout, self.provider.embed_query(query)).await?;
        self.search(&vector, k)
    }

    /// Removes every persisted and in-memory vector.
    pub async fn clear(&mut self) -> Result<(), IndexError> {
        self.store.clear().await?;
        self.engine = None;
        self.manifest = None;
        self.rejected_dimension = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::search::types::{DocumentFormat, Locator};
    use crate::storage::{InMemoryEmbeddingStore, RedbEmbeddingStore};
    use crate::testing::{FailingEmbedder, HashingEmbedder};
    use tempfile::TempDir;

    fn fragments(texts: &[&str]) -> Vec<Fragment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Fragment {
                id: FragmentId::from_string(format!("f{}", i)),
                text: text.to_string(),
                source_name: "notes.txt".to_string(),
                locator: Locator::None,
                origin_format: DocumentFormat::Text,
            })
            .collect()
    }

    async fn in_memory(provider: Arc<dyn EmbeddingProvider>) -> EmbeddingIndex {
        EmbeddingIndex::open(
            Box::new(InMemoryEmbeddingStore::new()),
            provider,
            100,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_not_initialized_before_add() {
        let index = in_memory(Arc::new(HashingEmbedder::new(16))).await;
        assert!(matches!(
            index.search(&[0.0; 16], 3),
            Err(IndexError::NotInitialized)
        ));
        assert!(matches!(
            index.search_text("anything", 3).await,
            Err(IndexError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_add_and_search_text() {
        let mut index = in_memory(Arc::new(HashingEmbedder::new(64))).await;
        index
            .add(&fragments(&["The cat sat.", "The dog ran."]))
            .await
            .unwrap();

        let results = index.search_text("cat", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment_id.as_str(), "f0");
        assert_eq!(index.dimension(), Some(64));
    }

    #[tokio::test]
    async fn test_provider_failure_persists_nothing() {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        let mut index = EmbeddingIndex::open(
            Box::new(SharedStore(store.clone())),
            Arc::new(FailingEmbedder::new(ProviderError::Http {
                status: 503,
                message: "unavailable".into(),
            })),
            100,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let result = index.add(&fragments(&["text"])).await;
        assert!(matches!(result, Err(IndexError::Provider(_))));
        assert!(index.is_empty());
        assert!(store.load().await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_storage() {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        let mut index = EmbeddingIndex::open(
            Box::new(SharedStore(store.clone())),
            Arc::new(HashingEmbedder::new(8)),
            100,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        index.add(&fragments(&["first"])).await.unwrap();

        index.provider = Arc::new(HashingEmbedder::new(4));
        let more = vec![Fragment {
            id: FragmentId::from_string("g0"),
            ..fragments(&["second"]).remove(0)
        }];
        assert!(matches!(
            index.add(&more).await,
            Err(IndexError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
        assert_eq!(index.len(), 1);
        assert_eq!(store.load().await.unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_from_redb() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.redb");
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(32));

        {
            let mut index = EmbeddingIndex::open(
                Box::new(RedbEmbeddingStore::open(&path).unwrap()),
                provider.clone(),
                100,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
            index
                .add(&fragments(&["alpha beta", "gamma delta"]))
                .await
                .unwrap();
        }

        let index = EmbeddingIndex::open(
            Box::new(RedbEmbeddingStore::open(&path).unwrap()),
            provider,
            100,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.stored_model_id(), Some("hashing-bow-32"));
        let results = index.search_text("gamma", 1).await.unwrap();
        assert_eq!(results[0].fragment_id.as_str(), "f1");
    }

    #[tokio::test]
    async fn test_clear_resets_to_not_initialized() {
        let mut index = in_memory(Arc::new(HashingEmbedder::new(16))).await;
        index.add(&fragments(&["text"])).await.unwrap();
        index.clear().await.unwrap();
        assert!(index.is_empty());
        assert!(index.stored_model_id().is_none());
        assert!(matches!(
            index.search(&[0.0; 16], 1),
            Err(IndexError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_rebuild_batch_may_change_dimension() {
        let mut index = in_memory(Arc::new(HashingEmbedder::new(8))).await;
        index.add(&fragments(&["text"])).await.unwrap();

        index.provider = Arc::new(HashingEmbedder::new(4));
        let batch = index.prepare_rebuild(&fragments(&["text"])).await.unwrap();
        index.clear().await.unwrap();
        index.commit(batch).await.unwrap();
        assert_eq!(index.dimension(), Some(4));
    }

    /// Hashing embedder that takes `delay` per request of at most `batch` texts.
    struct SlowBatches {
        inner: HashingEmbedder,
        batch: usize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowBatches {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            assert!(texts.len() <= self.batch);
            tokio::time::sleep(self.delay).await;
            self.inner.embed(texts).await
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn max_batch_size(&self) -> usize {
            self.batch
        }
    }

    #[tokio::test]
    async fn test_timeout_bounds_each_batch() {
        let provider = Arc::new(SlowBatches {
            inner: HashingEmbedder::new(16),
            batch: 1,
            delay: Duration::from_millis(40),
        });
        let mut index = EmbeddingIndex::open(
            Box::new(InMemoryEmbeddingStore::new()),
            provider,
            100,
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        index
            .add(&fragments(&["one", "two", "three", "four", "five"]))
            .await
            .unwrap();
        assert_eq!(index.len(), 5);
    }

    #[tokio::test]
    async fn test_slow_single_batch_times_out() {
        let provider = Arc::new(SlowBatches {
            inner: HashingEmbedder::new(16),
            batch: 8,
            delay: Duration::from_millis(200),
        });
        let mut index = EmbeddingIndex::open(
            Box::new(InMemoryEmbeddingStore::new()),
            provider,
            100,
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        assert!(matches!(
            index.add(&fragments(&["one"])).await,
            Err(IndexError::Provider(ProviderError::Timeout(_)))
        ));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_rows_disagreeing_with_manifest_are_not_loaded() {
        let store = InMemoryEmbeddingStore::new();
        let manifest = IndexManifest {
            count: 2,
            ..IndexManifest::new(4, "hashing-bow-4")
        };
        let rows = vec![
            StoredEmbedding {
                fragment_id: FragmentId::from_string("f0"),
                vector: vec![1.0; 4],
            },
            StoredEmbedding {
                fragment_id: FragmentId::from_string("f1"),
                vector: vec![1.0; 8],
            },
        ];
        store.put_batch(0, &rows, &manifest).await.unwrap();

        let mut index = EmbeddingIndex::open(
            Box::new(store),
            Arc::new(HashingEmbedder::new(4)),
            100,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(index.is_empty());
        assert_eq!(index.rejected_dimension(), Some((4, 8)));

        index.clear().await.unwrap();
        assert_eq!(index.rejected_dimension(), None);
        index.add(&fragments(&["text"])).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    /// Lets a test keep a handle on the store it gave away.
    struct SharedStore(Arc<InMemoryEmbeddingStore>);

    #[async_trait::async_trait]
    impl EmbeddingStore for SharedStore {
        async fn load(&self) -> Result<crate::storage::StoredEmbeddings, crate::storage::StoreError> {
            self.0.load().await
        }

        async fn put_batch(
            &self,
            start_seq: u64,
            rows: &[StoredEmbedding],
            manifest: &IndexManifest,
        ) -> Result<(), crate::storage::StoreError> {
            self.0.put_batch(start_seq, rows, manifest).await
        }

        async fn clear(&self) -> Result<(), crate::storage::StoreError> {
            self.0.clear().await
        }
    }
}
