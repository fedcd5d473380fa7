//! Persistence for the corpus and the embedding index.
//!
//! - [`CorpusStore`] - JSON snapshot of every fragment (`fragments.json`)
//! - [`EmbeddingStore`] - trait over vector persistence, with
//!   [`RedbEmbeddingStore`] (`embeddings.redb`) for production and
//!   [`InMemoryEmbeddingStore`] for tests

mod corpus_store;
mod redb_store;

pub use crate::error::StoreError;
pub use corpus_store::CorpusStore;
pub use redb_store::RedbEmbeddingStore;

use crate::search::types::FragmentId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Layout version of persisted embedding data.
pub const EMBEDDING_SCHEMA_VERSION: u32 = 1;

/// Describes the vectors held by an embedding store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub schema_version: u32,
    pub dimension: usize,
    /// Model id reported by the embedding provider
    pub model_id: String,
    pub count: usize,
}

impl IndexManifest {
    pub fn new(dimension: usize, model_id: impl Into<String>) -> Self {
        Self {
            schema_version: EMBEDDING_SCHEMA_VERSION,
            dimension,
            model_id: model_id.into(),
            count: 0,
        }
    }
}

/// One persisted `(fragment_id, vector)` row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub fragment_id: FragmentId,
    pub vector: Vec<f32>,
}

/// Everything an embedding store holds, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredEmbeddings {
    pub manifest: Option<IndexManifest>,
    pub rows: Vec<StoredEmbedding>,
}

/// Durable storage behind the embedding index.
///
/// Rows are keyed by insertion sequence. Each call is one transaction:
/// after an error nothing from that call is visible.
#[async_trait::async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Reads every row and the manifest.
    async fn load(&self) -> Result<StoredEmbeddings, StoreError>;

    /// Writes `rows` at `start_seq..` together with the updated manifest.
    async fn put_batch(
        &self,
        start_seq: u64,
        rows: &[StoredEmbedding],
        manifest: &IndexManifest,
    ) -> Result<(), StoreError>;

    /// Removes every row and the manifest.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Non-persistent store for tests and throwaway engines.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    inner: Mutex<StoredEmbeddings>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoredEmbeddings>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::DatabaseError("in-memory store poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn load(&self) -> Result<StoredEmbeddings, StoreError> {
        Ok(self.lock()?.clone())
    }

    async fn put_batch(
        &self,
        start_seq: u64,
        rows: &[StoredEmbedding],
        manifest: &IndexManifest,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let start = start_seq as usize;
        if start > inner.rows.len() {
            return Err(StoreError::DatabaseError(format!(
                "non-contiguous write at {} (have {})",
                start,
                inner.rows.len()
            )));
        }
        inner.rows.truncate(start);
        inner.rows.extend_from_slice(rows);
        inner.manifest = Some(manifest.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.lock()? = StoredEmbeddings::default();
        Ok(())
    }
}
