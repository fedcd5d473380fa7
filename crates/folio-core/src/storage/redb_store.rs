//! Redb-backed embedding store.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust, ACID-compliant
//! embedded B-tree database. Every public operation is a single transaction.
//!
//! # Tables
//!
//! - `vectors`: sequence (u64) -> `Vec<f32>` (raw bytes, little-endian)
//! - `fragment_ids`: sequence (u64) -> fragment id (string)
//! - `manifest`: key (string) -> [`IndexManifest`] (JSON)

use super::{EmbeddingStore, IndexManifest, StoreError, StoredEmbedding, StoredEmbeddings};
use crate::search::types::FragmentId;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const VECTORS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const FRAGMENT_IDS_TABLE: TableDefinition<u64, &str> = TableDefinition::new("fragment_ids");
const MANIFEST_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("manifest");

const MANIFEST_KEY: &str = "manifest";

/// Embedding store persisted to a single redb file.
///
/// ```ignore
/// use folio_core::storage::RedbEmbeddingStore;
///
/// let store = RedbEmbeddingStore::open("./data/embeddings.redb")?;
/// let stored = store.load().await?;
/// ```
pub struct RedbEmbeddingStore {
    db: Arc<Database>,
}

impl RedbEmbeddingStore {
    /// Opens or creates the database, creating all tables if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open database: {}", e)))?;

        {
            let write_txn = db.begin_write().map_err(|e| {
                StoreError::DatabaseError(format!("Failed to begin write transaction: {}", e))
            })?;

            write_txn.open_table(VECTORS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create vectors table: {}", e))
            })?;
            write_txn.open_table(FRAGMENT_IDS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create fragment_ids table: {}", e))
            })?;
            write_txn.open_table(MANIFEST_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create manifest table: {}", e))
            })?;

            write_txn.commit().map_err(|e| {
                StoreError::DatabaseError(format!("Failed to commit table creation: {}", e))
            })?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Little-endian f32 values packed sequentially (4 bytes per value).
    ///
    /// Must stay in sync with [`deserialize_vector`](Self::deserialize_vector).
    fn serialize_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for &val in vector {
            bytes.extend_from_slice(&val.to_le_bytes());
        }
        bytes
    }

    fn deserialize_vector(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
        if bytes.len() % 4 != 0 {
            return Err(StoreError::SerializationError(format!(
                "Vector byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    fn serialize_manifest(manifest: &IndexManifest) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(manifest).map_err(|e| {
            StoreError::SerializationError(format!("Failed to serialize manifest: {}", e))
        })
    }

    fn deserialize_manifest(bytes: &[u8]) -> Result<IndexManifest, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| {
            StoreError::SerializationError(format!("Failed to deserialize manifest: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingStore for RedbEmbeddingStore {
    async fn load(&self) -> Result<StoredEmbeddings, StoreError> {
        let read_txn = self.db.begin_read().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin read transaction: {}", e))
        })?;

        let manifest_table = read_txn.open_table(MANIFEST_TABLE).map_err(|e| {
            StoreError::DatabaseError(format!("Failed to open manifest table: {}", e))
        })?;
        let manifest = match manifest_table.get(MANIFEST_KEY) {
            Ok(Some(guard)) => Some(Self::deserialize_manifest(guard.value())?),
            Ok(None) => None,
            Err(e) => {
                return Err(StoreError::DatabaseError(format!(
                    "Failed to read manifest: {}",
                    e
                )))
            }
        };

        let vectors = read_txn.open_table(VECTORS_TABLE).map_err(|e| {
            StoreError::DatabaseError(format!("Failed to open vectors table: {}", e))
        })?;
        let ids = read_txn.open_table(FRAGMENT_IDS_TABLE).map_err(|e| {
            StoreError::DatabaseError(format!("Failed to open fragment_ids table: {}", e))
        })?;

        let mut rows = Vec::new();
        let iter = vectors
            .iter()
            .map_err(|e| StoreError::DatabaseError(format!("Failed to iterate vectors: {}", e)))?;

        for (expected_seq, result) in iter.enumerate() {
            let (key, value) = result.map_err(|e| {
                StoreError::DatabaseError(format!("Failed to read vector entry: {}", e))
            })?;
            let seq = key.value();
            if seq != expected_seq as u64 {
                return Err(StoreError::DatabaseError(format!(
                    "Gap in vector sequence: expected {}, found {}",
                    expected_seq, seq
                )));
            }

            let fragment_id = match ids.get(seq) {
                Ok(Some(guard)) => FragmentId::from_string(guard.value()),
                Ok(None) => {
                    return Err(StoreError::DatabaseError(format!(
                        "Vector {} has no fragment id",
                        seq
                    )))
                }
                Err(e) => {
                    return Err(StoreError::DatabaseError(format!(
                        "Failed to read fragment id: {}",
                        e
                    )))
                }
            };

            rows.push(StoredEmbedding {
                fragment_id,
                vector: Self::deserialize_vector(value.value())?,
            });
        }

        debug!("Loaded {} stored embeddings", rows.len());
        Ok(StoredEmbeddings { manifest, rows })
    }

    async fn put_batch(
        &self,
        start_seq: u64,
        rows: &[StoredEmbedding],
        manifest: &IndexManifest,
    ) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin write transaction: {}", e))
        })?;

        {
            let mut vectors = write_txn.open_table(VECTORS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open vectors table: {}", e))
            })?;
            let mut ids = write_txn.open_table(FRAGMENT_IDS_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open fragment_ids table: {}", e))
            })?;

            for (offset, row) in rows.iter().enumerate() {
                let seq = start_seq + offset as u64;
                let bytes = Self::serialize_vector(&row.vector);
                vectors.insert(seq, bytes.as_slice()).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to insert vector: {}", e))
                })?;
                ids.insert(seq, row.fragment_id.as_str()).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to insert fragment id: {}", e))
                })?;
            }

            let mut manifest_table = write_txn.open_table(MANIFEST_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open manifest table: {}", e))
            })?;
            let bytes = Self::serialize_manifest(manifest)?;
            manifest_table
                .insert(MANIFEST_KEY, bytes.as_slice())
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to write manifest: {}", e))
                })?;
        }

        write_txn
            .commit()
            .map_err(|e| StoreError::DatabaseError(format!("Failed to commit batch: {}", e)))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin write transaction: {}", e))
        })?;

        fn clear_u64_table<V: redb::Value + 'static>(
            write_txn: &redb::WriteTransaction,
            table_def: TableDefinition<u64, V>,
            table_name: &str,
        ) -> Result<usize, StoreError> {
            let mut table = write_txn.open_table(table_def).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open {} table: {}", table_name, e))
            })?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(|e| {
                StoreError::DatabaseError(format!("Failed to iterate {}: {}", table_name, e))
            })? {
                let (key, _) = entry.map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to read {} entry: {}", table_name, e))
                })?;
                keys.push(key.value());
            }
            for key in &keys {
                table.remove(*key).map_err(|e| {
                    StoreError::DatabaseError(format!(
                        "Failed to remove key {} from {}: {}",
                        key, table_name, e
                    ))
                })?;
            }
            Ok(keys.len())
        }

        let removed = clear_u64_table(&write_txn, VECTORS_TABLE, "vectors")?;
        clear_u64_table(&write_txn, FRAGMENT_IDS_TABLE, "fragment_ids")?;
        {
            let mut manifest_table = write_txn.open_table(MANIFEST_TABLE).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open manifest table: {}", e))
            })?;
            manifest_table.remove(MANIFEST_KEY).map_err(|e| {
                StoreError::DatabaseError(format!("Failed to remove manifest: {}", e))
            })?;
        }

        write_txn
            .commit()
            .map_err(|e| StoreError::DatabaseError(format!("Failed to commit clear: {}", e)))?;

        debug!("Cleared {} stored embeddings", removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbEmbeddingStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("embeddings.redb");
        let store = RedbEmbeddingStore::open(&db_path).unwrap();
        (store, temp_dir)
    }

    fn row(id: &str, vector: Vec<f32>) -> StoredEmbedding {
        StoredEmbedding {
            fragment_id: FragmentId::from_string(id),
            vector,
        }
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (store, _temp) = create_test_store();
        let loaded = store.load().await.unwrap();
        assert!(loaded.manifest.is_none());
        assert!(loaded.rows.is_empty());
    }

    #[tokio::test]
    async fn test_batches_round_trip() {
        let (store, _temp) = create_test_store();
        let mut manifest = IndexManifest::new(3, "model-a");

        manifest.count = 2;
        store
            .put_batch(
                0,
                &[row("a", vec![1.0, 0.0, 0.0]), row("b", vec![0.5, -0.25, 2.0])],
                &manifest,
            )
            .await
            .unwrap();
        manifest.count = 3;
        store
            .put_batch(2, &[row("c", vec![0.0, 1.0, 0.0])], &manifest)
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.manifest, Some(manifest));
        let ids: Vec<&str> = loaded.rows.iter().map(|r| r.fragment_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(loaded.rows[1].vector, vec![0.5, -0.25, 2.0]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("embeddings.redb");
        let manifest = IndexManifest {
            count: 1,
            ..IndexManifest::new(2, "model-a")
        };

        {
            let store = RedbEmbeddingStore::open(&db_path).unwrap();
            store
                .put_batch(0, &[row("a", vec![1.0, 2.0])], &manifest)
                .await
                .unwrap();
        }

        let store = RedbEmbeddingStore::open(&db_path).unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.manifest.unwrap().model_id, "model-a");
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (store, _temp) = create_test_store();
        let manifest = IndexManifest {
            count: 2,
            ..IndexManifest::new(1, "model-a")
        };
        store
            .put_batch(0, &[row("a", vec![1.0]), row("b", vec![2.0])], &manifest)
            .await
            .unwrap();

        store.clear().await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.manifest.is_none());
        assert!(loaded.rows.is_empty());
    }

    #[test]
    fn test_vector_serialization() {
        let vector = vec![1.5f32, -0.0, f32::MIN_POSITIVE];
        let bytes = RedbEmbeddingStore::serialize_vector(&vector);
        assert_eq!(bytes.len(), 12);
        assert_eq!(
            RedbEmbeddingStore::deserialize_vector(&bytes).unwrap(),
            vector
        );
        assert!(RedbEmbeddingStore::deserialize_vector(&[0, 1, 2]).is_err());
    }
}
