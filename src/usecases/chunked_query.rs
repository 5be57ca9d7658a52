//! Chunked Query Use Case - Adaptive Historical Log Retrieval
//!
//! Walks an inclusive block range in windows. Each accepted window grows
//! the step by a quarter; each window the provider rejects as too large
//! halves it and is retried after a fixed backoff. Other provider errors
//! abort the scan.
//!
//! There is no overall deadline: a provider that keeps rejecting the
//! minimum window stalls the scan, with a warning per attempt.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ChunkConfig;
use crate::domain::{
  ChunkProgress, ContractEvent, EventKind, QueryErrorClass, StepBounds, StepController, classify,
};
use crate::error::{ListenerError, ListenerResult};
use crate::ports::LogSource;

/// Window sizing and retry pause.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
  pub bounds: StepBounds,
  /// Pause before retrying a rejected window.
  pub backoff: Duration,
}

impl Default for ChunkOptions {
  fn default() -> Self {
    Self::from(&ChunkConfig::default())
  }
}

impl From<&ChunkConfig> for ChunkOptions {
  fn from(config: &ChunkConfig) -> Self {
    Self {
      bounds: config.bounds,
      backoff: Duration::from_millis(config.backoff_ms),
    }
  }
}

/// Fetch every `kind` event in `from_block..=to_block`.
///
/// `on_chunk` fires after each accepted window. Returns an empty list
/// when `from_block > to_block`.
///
/// # Errors
/// `ListenerError::Rpc` for any provider failure that is not a range
/// limit. Range limits are absorbed.
pub async fn query_filter_chunked<S, F>(
  source: &S,
  kind: EventKind,
  from_block: u64,
  to_block: u64,
  options: &ChunkOptions,
  mut on_chunk: F,
) -> ListenerResult<Vec<ContractEvent>>
where
  S: LogSource + ?Sized,
  F: FnMut(&ChunkProgress),
{
  let mut events = Vec::new();
  if from_block > to_block {
    return Ok(events);
  }

  let mut step = StepController::new(options.bounds);
  let mut start = from_block;
  let mut chunk_count = 0_u64;
  let mut rejected = 0_u64;

  loop {
    let (from, to) = step.window(start, to_block);

    match source.query_logs(kind, from, to).await {
      Ok(batch) => {
        events.extend(batch);
        chunk_count += 1;
        step.grow();

        let progress = ChunkProgress {
          from,
          to,
          step: step.step(),
          chunk_count,
          total_count: events.len(),
          rejected,
        };
        debug!(
          event = %kind,
          from,
          to,
          step = progress.step,
          chunks = chunk_count,
          total = progress.total_count,
          "Chunk fetched"
        );
        on_chunk(&progress);
        rejected = 0;

        if to >= to_block {
          break;
        }
        start = to + 1;
      }
      Err(failure) => match classify(&failure) {
        QueryErrorClass::RangeLimit => {
          rejected += 1;
          let err = ListenerError::RangeLimit {
            from,
            to,
            source: failure,
          };
          if step.shrink() {
            warn!(event = %kind, step = step.step(), error = %err, "Window too large, shrinking");
          } else {
            warn!(
              event = %kind,
              step = step.step(),
              error = %err,
              "Window rejected at minimum step, retrying"
            );
          }
          tokio::time::sleep(options.backoff).await;
        }
        QueryErrorClass::Fatal | QueryErrorClass::Unknown => {
          return Err(ListenerError::Rpc {
            from,
            to,
            source: failure,
          });
        }
      },
    }
  }

  Ok(events)
}
