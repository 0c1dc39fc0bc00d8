//! Content-addressed task store.
//!
//! One JSON snapshot per document at `{llm_dir}/{document}_llm_cache.json`.
//! The engine is the single writer and replaces the whole file on every
//! checkpoint (write to a sibling temp file, then rename). Readers must treat
//! read failures as transient.

mod merge;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use thiserror::Error;
use tokio::fs;

use crate::task::Snapshot;

pub use merge::{merge, MergeReport};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Modification time plus size. Coarse filesystem clocks can give two quick
/// checkpoints the same mtime; their sizes almost always differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub modified: SystemTime,
    pub len: u64,
}

/// Snapshot file of one document.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `document` inside `llm_dir`.
    pub fn for_document(llm_dir: &Path, document: &str) -> Self {
        Self::new(llm_dir.join(format!("{}_llm_cache.json", document)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the snapshot. `Ok(None)` when no snapshot was ever written.
    pub async fn load(&self) -> StoreResult<Option<Snapshot>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the snapshot, treating a missing or unreadable file as "no prior history".
    pub async fn load_or_default(&self) -> Snapshot {
        match self.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No previous snapshot, starting fresh");
                Snapshot::default()
            }
            Err(e) => {
                tracing::warn!("{}, discarding history", e);
                Snapshot::default()
            }
        }
    }

    /// Checkpoint: replace the whole snapshot file.
    pub async fn save(&self, snapshot: &mut Snapshot) -> StoreResult<()> {
        snapshot.updated_at = Some(Utc::now());
        let contents = serde_json::to_string_pretty(snapshot)?;

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let tmp = self.temp_path();
        fs::write(&tmp, contents).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        tracing::debug!(
            path = %self.path.display(),
            tasks = snapshot.tasks.len(),
            "Checkpointed snapshot"
        );
        Ok(())
    }

    /// Cheap change marker for pollers.
    pub async fn version(&self) -> Option<SnapshotVersion> {
        let metadata = fs::metadata(&self.path).await.ok()?;
        Some(SnapshotVersion {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Chunk, ChunkKind, Task, TaskStatus};
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.tasks.push(Task::from_chunk(&Chunk {
            kind: ChunkKind::Header,
            text: "Intro".to_string(),
            index: 0,
        }));
        snapshot.references = "[1] Someone".to_string();
        snapshot.asset_map.insert(0, vec!["Figure 1".to_string()]);
        snapshot
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::for_document(temp.path(), "paper");
        assert!(store.load().await.unwrap().is_none());

        let mut snapshot = sample();
        store.save(&mut snapshot).await.unwrap();
        assert!(snapshot.updated_at.is_some());
        assert!(store.path().ends_with("paper_llm_cache.json"));
        assert!(!store.temp_path().exists());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.tasks[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_no_history() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::for_document(temp.path(), "paper");
        tokio::fs::write(store.path(), "{ \"tasks\": [ trunc").await.unwrap();

        assert!(matches!(store.load().await, Err(StoreError::Corrupt { .. })));
        assert_eq!(store.load_or_default().await, Snapshot::default());
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_overwrites() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("nested/dir/doc.json"));

        let mut snapshot = sample();
        store.save(&mut snapshot).await.unwrap();
        snapshot.tasks.clear();
        store.save(&mut snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.tasks.is_empty());
        let before = store.version().await.unwrap();
        snapshot.references = "[1] Someone else, at length".to_string();
        store.save(&mut snapshot).await.unwrap();
        assert_ne!(store.version().await.unwrap(), before);
    }
}
