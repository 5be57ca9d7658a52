//! Repository Implementation - Concrete Adapter for the Repository Port
//!
//! Wraps `CheckpointStore` (atomic JSON) and `DeadLetterLog` (JSONL
//! append-only) into a single struct that implements the `Repository`
//! trait. The use cases only know the trait, never files or JSON.

use std::path::Path;

use async_trait::async_trait;

use super::checkpoint::CheckpointStore;
use super::dead_letter::DeadLetterLog;
use crate::error::ListenerResult;
use crate::ports::{DeadLetter, Repository};

/// File-backed repository rooted at the data directory.
pub struct FileRepository {
    checkpoints: CheckpointStore,
    dead_letters: DeadLetterLog,
}

impl FileRepository {
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            checkpoints: CheckpointStore::new(data_dir),
            dead_letters: DeadLetterLog::new(data_dir),
        }
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn load_checkpoint(&self, network: &str) -> ListenerResult<Option<u64>> {
        self.checkpoints.load(network).await
    }

    async fn save_checkpoint(&self, network: &str, block: u64) -> ListenerResult<()> {
        self.checkpoints.save(network, block).await
    }

    async fn append_dead_letter(&self, network: &str, letter: &DeadLetter) -> ListenerResult<()> {
        self.dead_letters.append(network, letter).await
    }

    async fn load_dead_letters(&self, network: &str) -> ListenerResult<Vec<DeadLetter>> {
        self.dead_letters.load_all(network).await
    }

    async fn is_healthy(&self) -> bool {
        self.checkpoints.is_healthy().await
    }
}
