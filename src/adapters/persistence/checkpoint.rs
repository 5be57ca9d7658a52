//! Checkpoint Store - Atomic JSON Last-Processed-Block Persistence
//!
//! One `loadedTo.json` per network under the data directory, written
//! with tmp-then-rename so a crash mid-write leaves either the old or the
//! new checkpoint on disk, never a torn file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::error::{ListenerError, ListenerResult};

const CHECKPOINT_FILE: &str = "loadedTo.json";

/// On-disk checkpoint document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDocument {
    pub last_processed_block: u64,
}

/// Atomic JSON checkpoint store.
pub struct CheckpointStore {
    /// Root data directory; each network gets a subdirectory.
    data_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path to a network's checkpoint file.
    pub fn path(&self, network: &str) -> PathBuf {
        self.data_dir.join(network).join(CHECKPOINT_FILE)
    }

    /// Save the checkpoint atomically (tmp → rename).
    #[instrument(skip(self))]
    pub async fn save(&self, network: &str, block: u64) -> ListenerResult<()> {
        let path = self.path(network);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let tmp_path = tmp_path(&path);

        let json = serde_json::to_string_pretty(&CheckpointDocument {
            last_processed_block: block,
        })
        .map_err(|e| ListenerError::Io(std::io::Error::other(e)))?;

        fs::write(&tmp_path, &json).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!(path = %path.display(), block, "Checkpoint saved");
        Ok(())
    }

    /// Load the checkpoint.
    ///
    /// Returns `None` if the file does not exist (first run).
    #[instrument(skip(self))]
    pub async fn load(&self, network: &str) -> ListenerResult<Option<u64>> {
        let path = self.path(network);
        if !path.exists() {
            info!(path = %path.display(), "No checkpoint found, starting fresh");
            return Ok(None);
        }

        let corruption = |reason: String| ListenerError::CheckpointCorruption {
            path: path.clone(),
            reason,
        };

        let json = fs::read_to_string(&path)
            .await
            .map_err(|e| corruption(e.to_string()))?;
        let doc: CheckpointDocument =
            serde_json::from_str(&json).map_err(|e| corruption(e.to_string()))?;

        info!(block = doc.last_processed_block, "Checkpoint loaded");
        Ok(Some(doc.last_processed_block))
    }

    /// Check that the data directory is writable.
    pub async fn is_healthy(&self) -> bool {
        if fs::create_dir_all(&self.data_dir).await.is_err() {
            return false;
        }
        let probe = self.data_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
