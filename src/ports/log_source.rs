//! Log Source Port - Chain Head and Ranged Log Queries
//!
//! Errors stay as `RpcFailure` rather than `anyhow::Error` so the chunked
//! query helper can classify range-limit rejections.

use async_trait::async_trait;

use crate::domain::{ContractEvent, EventId, EventKind, RpcFailure};

/// Read access to the chain for one deployment of the contracts.
#[async_trait]
pub trait LogSource: Send + Sync + 'static {
  /// Current chain height.
  async fn block_number(&self) -> Result<u64, RpcFailure>;

  /// Decoded events of one kind in the inclusive block range.
  async fn query_logs(
    &self,
    kind: EventKind,
    from_block: u64,
    to_block: u64,
  ) -> Result<Vec<ContractEvent>, RpcFailure>;

  /// Event kinds this deployment can serve.
  fn event_kinds(&self) -> Vec<EventKind>;
}

/// Message from the live subscription tasks to the pipeline.
#[derive(Debug, Clone)]
pub enum FeedMessage {
  /// A decoded live event.
  Event(ContractEvent),
  /// A previously delivered log was removed by a reorg.
  Removed { id: EventId, block: u64 },
  /// A subscription stream ended; it will not be reopened.
  Closed {
    kind: EventKind,
    reason: String,
  },
}
