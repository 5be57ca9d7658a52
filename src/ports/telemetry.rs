//! Telemetry Port - Pipeline Observability Hooks
//!
//! The pipeline reports progress through this trait so use cases never
//! touch Prometheus or the health server directly. Every hook defaults
//! to a no-op.

use crate::domain::{ChunkProgress, EventKind, EventSource, Phase, RpcFailure, TickReport};

/// Observer of pipeline progress.
pub trait Telemetry: Send + Sync + 'static {
  /// The pipeline moved to a new phase.
  fn phase_changed(&self, _phase: Phase) {}

  /// A historical query window was accepted.
  fn chunk_completed(&self, _kind: EventKind, _progress: &ChunkProgress) {}

  /// Events were offered to the accumulator; `tracked` were new.
  fn events_recorded(&self, _source: EventSource, _tracked: usize) {}

  /// A tick finished.
  fn tick_completed(&self, _report: &TickReport) {}

  /// The head poll failed.
  fn head_poll_failed(&self, _failure: &RpcFailure) {}

  /// The live feed stopped; the checkpoint is now capped at `frozen_at`.
  fn live_feed_lost(&self, _frozen_at: Option<u64>) {}
}

/// Telemetry that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

impl Telemetry for NoTelemetry {}
