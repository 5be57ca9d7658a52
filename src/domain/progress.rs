//! Pipeline progress types.
//!
//! Reported by the use cases to telemetry and logs.

use std::fmt;

use super::queue::QueueStatus;

/// Pipeline lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Loading checkpoint and dead-letter state.
    Startup,
    /// Fetching history between the checkpoint and the startup head.
    CatchUp,
    /// Consuming the live feed and ticking on the poll interval.
    Live,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup => write!(f, "startup"),
            Self::CatchUp => write!(f, "catch_up"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Where a recorded event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    CatchUp,
    Live,
}

impl EventSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CatchUp => "catch_up",
            Self::Live => "live",
        }
    }
}

/// Progress after one accepted historical query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// First block of the window.
    pub from: u64,
    /// Last block of the window (inclusive).
    pub to: u64,
    /// Window size for the next query.
    pub step: u64,
    /// Windows accepted so far.
    pub chunk_count: u64,
    /// Events collected so far.
    pub total_count: usize,
    /// Windows rejected as too large since the previous accepted one.
    pub rejected: u64,
}

/// Outcome of one accumulator tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub head: u64,
    /// Events handed downstream.
    pub dispatched: usize,
    /// Downstream calls that failed.
    pub failed_dispatches: usize,
    /// Events dead-lettered after exhausting retries.
    pub exhausted: usize,
    /// Events dead-lettered as stale.
    pub stale: usize,
    /// Checkpoint persisted during this tick, if any.
    pub checkpoint_saved: Option<u64>,
    /// Checkpoint on disk after this tick.
    pub persisted_checkpoint: Option<u64>,
    pub status: QueueStatus,
}
