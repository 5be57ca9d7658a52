//! Catch-up Use Case - Missed Events Between Checkpoint and Head
//!
//! Runs the chunked query for every event kind the deployment serves,
//! then merges the results into one batch in chain order.

use tracing::{info, instrument};

use super::chunked_query::{ChunkOptions, query_filter_chunked};
use crate::domain::{ChunkProgress, ContractEvent, EventKind};
use crate::error::ListenerResult;
use crate::ports::LogSource;

/// Fetch all events in `from_block..=to_block`, sorted by
/// `(block_number, log_index)` and unique by id.
///
/// # Errors
/// The first non range-limit provider failure.
#[instrument(skip(source, options, on_chunk))]
pub async fn catch_up_missed_events<S, F>(
  source: &S,
  from_block: u64,
  to_block: u64,
  options: &ChunkOptions,
  mut on_chunk: F,
) -> ListenerResult<Vec<ContractEvent>>
where
  S: LogSource + ?Sized,
  F: FnMut(EventKind, &ChunkProgress),
{
  if from_block > to_block {
    info!("Nothing to catch up");
    return Ok(Vec::new());
  }

  let mut merged = Vec::new();
  for kind in source.event_kinds() {
    let events =
      query_filter_chunked(source, kind, from_block, to_block, options, |p| on_chunk(kind, p)).await?;
    info!(event = %kind, count = events.len(), "Fetched historical events");
    merged.extend(events);
  }

  merged.sort_by_key(ContractEvent::chain_position);
  merged.dedup_by(|a, b| a.id == b.id);

  info!(total = merged.len(), "Catch-up complete");
  Ok(merged)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::{RpcFailure, SquareEvent, StepBounds};

  struct TwoKinds;

  #[async_trait]
  impl LogSource for TwoKinds {
    async fn block_number(&self) -> Result<u64, RpcFailure> {
      Ok(100)
    }

    async fn query_logs(
      &self,
      kind: EventKind,
      from_block: u64,
      to_block: u64,
    ) -> Result<Vec<ContractEvent>, RpcFailure> {
      let all = match kind {
        EventKind::Personalized => vec![
          ContractEvent::new(40, 3, "0xb", SquareEvent::Personalized { square: 2 }),
          ContractEvent::new(12, 0, "0xa", SquareEvent::Personalized { square: 1 }),
        ],
        _ => vec![ContractEvent::new(
          40,
          1,
          "0xc",
          SquareEvent::Transfer {
            from: "0x0".into(),
            to: "0x1".into(),
            square: 2,
          },
        )],
      };
      Ok(
        all
          .into_iter()
          .filter(|e| (from_block..=to_block).contains(&e.block_number))
          .collect(),
      )
    }

    fn event_kinds(&self) -> Vec<EventKind> {
      vec![EventKind::Personalized, EventKind::Transfer]
    }
  }

  #[tokio::test]
  async fn test_merges_kinds_in_chain_order() {
    let options = ChunkOptions {
      bounds: StepBounds {
        initial: 25,
        min: 25,
        max: 25,
      },
      backoff: Duration::ZERO,
    };
    let mut chunks = 0;
    let events = catch_up_missed_events(&TwoKinds, 1, 100, &options, |_, _| chunks += 1)
      .await
      .unwrap();

    let positions: Vec<(u64, u64)> = events.iter().map(ContractEvent::chain_position).collect();
    assert_eq!(positions, vec![(12, 0), (40, 1), (40, 3)]);
    assert_eq!(chunks, 8);
  }

  #[tokio::test]
  async fn test_inverted_range_is_empty() {
    let events = catch_up_missed_events(&TwoKinds, 101, 100, &ChunkOptions::default(), |_, _| {})
      .await
      .unwrap();
    assert!(events.is_empty());
  }
}
