//! Repository Port - Checkpoint and Dead-Letter Persistence
//!
//! File-backed, no database. The checkpoint is a single overwritten JSON
//! document per network; dead letters are an append-only JSONL log of
//! events the pipeline gave up on, kept for manual replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ContractEvent;
use crate::error::ListenerResult;

/// Why an event left the pipeline without being dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeadLetterReason {
  /// Dispatch failed on every allowed attempt.
  #[serde(rename_all = "camelCase")]
  Failed { attempts: u32, last_error: String },
  /// Never reached the confirmation depth within the retention time.
  #[serde(rename_all = "camelCase")]
  Stale { age_secs: i64 },
}

impl DeadLetterReason {
  /// Metrics label.
  pub const fn label(&self) -> &'static str {
    match self {
      Self::Failed { .. } => "failed",
      Self::Stale { .. } => "stale",
    }
  }
}

/// One dead-letter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
  pub event: ContractEvent,
  pub reason: DeadLetterReason,
  pub recorded_at: DateTime<Utc>,
}

/// Trait for listener state persistence.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
  /// Last processed block for the network, `None` when never written.
  ///
  /// # Errors
  /// `ListenerError::CheckpointCorruption` when the file exists but is
  /// unreadable or malformed.
  async fn load_checkpoint(&self, network: &str) -> ListenerResult<Option<u64>>;

  /// Atomically overwrite the checkpoint.
  async fn save_checkpoint(&self, network: &str, block: u64) -> ListenerResult<()>;

  /// Append an event the pipeline gave up on.
  async fn append_dead_letter(&self, network: &str, letter: &DeadLetter) -> ListenerResult<()>;

  /// All dead letters recorded for the network.
  async fn load_dead_letters(&self, network: &str) -> ListenerResult<Vec<DeadLetter>>;

  /// Whether the data directory is usable.
  async fn is_healthy(&self) -> bool;
}
