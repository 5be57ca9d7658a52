//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! listener's workflows.
//!
//! Use cases:
//! - `query_filter_chunked`: adaptive-window historical log queries
//! - `catch_up_missed_events`: merged history for every event kind
//! - `EventAccumulator`: confirmation tracking, dispatch, checkpointing
//! - `ListenerPipeline`: Startup → CatchUp → Live orchestration

pub mod accumulator;
pub mod catch_up;
pub mod chunked_query;
pub mod listener;

pub use accumulator::EventAccumulator;
pub use catch_up::catch_up_missed_events;
pub use chunked_query::{ChunkOptions, query_filter_chunked};
pub use listener::{CatchUpReport, ListenerPipeline, PipelineOptions};
