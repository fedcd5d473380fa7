//! Durable, append-only record of every ingested fragment.
//!
//! The whole corpus is kept in memory and mirrored to a JSON snapshot. Every
//! write replaces the snapshot atomically (temp file, fsync, rename), so a
//! failed write leaves the previous snapshot in place.

use super::StoreError;
use crate::search::types::{Fragment, FragmentId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Layout version of `fragments.json`.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    fragments: &'a [Fragment],
}

#[derive(Deserialize)]
struct Snapshot {
    schema_version: u32,
    fragments: Vec<Fragment>,
}

/// Fragment snapshot store.
///
/// Ordinals are insertion positions and stay stable until [`clear`](Self::clear).
#[derive(Debug)]
pub struct CorpusStore {
    path: PathBuf,
    fragments: Vec<Fragment>,
    ordinals: HashMap<FragmentId, usize>,
}

impl CorpusStore {
    /// Opens the snapshot at `path`, or starts empty if it does not exist.
    ///
    /// # Errors
    ///
    /// A snapshot that exists but cannot be decoded is reported instead of
    /// being discarded.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let fragments = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::SerializationError(format!(
                        "Corrupt fragment snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
                    return Err(StoreError::SerializationError(format!(
                        "Unsupported snapshot schema version {} (expected {})",
                        snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION
                    )));
                }
                info!("Loaded {} fragments from snapshot", snapshot.fragments.len());
                snapshot.fragments
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No fragment snapshot, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(StoreError::IoError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut ordinals = HashMap::with_capacity(fragments.len());
        for (ordinal, fragment) in fragments.iter().enumerate() {
            if ordinals.insert(fragment.id.clone(), ordinal).is_some() {
                return Err(StoreError::SerializationError(format!(
                    "Duplicate fragment id {} in snapshot",
                    fragment.id
                )));
            }
        }

        Ok(Self {
            path,
            fragments,
            ordinals,
        })
    }

    /// Appends fragments in order and persists the new snapshot.
    ///
    /// Returns the ordinal of the first appended fragment. Ids already in the
    /// store must be filtered out by the caller.
    ///
    /// # Errors
    ///
    /// On failure neither the snapshot nor the in-memory state changes.
    #[instrument(skip_all, fields(count = fragments.len()))]
    pub async fn append(&mut self, fragments: Vec<Fragment>) -> Result<usize, StoreError> {
        let start = self.fragments.len();
        if let Some(dup) = fragments.iter().find(|f| self.ordinals.contains_key(&f.id)) {
            return Err(StoreError::DatabaseError(format!(
                "Fragment {} already stored",
                dup.id
            )));
        }

        let mut combined = Vec::with_capacity(start + fragments.len());
        combined.extend_from_slice(&self.fragments);
        combined.extend(fragments);
        write_snapshot(&self.path, &combined).await?;

        for (ordinal, fragment) in combined.iter().enumerate().skip(start) {
            self.ordinals.insert(fragment.id.clone(), ordinal);
        }
        self.fragments = combined;
        debug!("Corpus now holds {} fragments", self.fragments.len());
        Ok(start)
    }

    /// Drops every fragment at or after `len` and persists the result.
    ///
    /// Used to undo an append whose index commit failed.
    pub async fn truncate(&mut self, len: usize) -> Result<(), StoreError> {
        if len >= self.fragments.len() {
            return Ok(());
        }
        write_snapshot(&self.path, &self.fragments[..len]).await?;
        for fragment in self.fragments.drain(len..) {
            self.ordinals.remove(&fragment.id);
        }
        Ok(())
    }

    /// Removes the snapshot and forgets every fragment.
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::IoError(format!(
                    "Failed to remove {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
        self.fragments.clear();
        self.ordinals.clear();
        Ok(())
    }

    /// Every fragment in insertion order.
    pub fn all(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn get(&self, ordinal: usize) -> Option<&Fragment> {
        self.fragments.get(ordinal)
    }

    pub fn contains(&self, id: &FragmentId) -> bool {
        self.ordinals.contains_key(id)
    }

    pub fn ordinal_of(&self, id: &FragmentId) -> Option<usize> {
        self.ordinals.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot_exists(&self) -> bool {
        self.path.exists()
    }
}

async fn write_snapshot(path: &Path, fragments: &[Fragment]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(&SnapshotRef {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        fragments,
    })
    .map_err(|e| StoreError::SerializationError(format!("Failed to encode snapshot: {}", e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
