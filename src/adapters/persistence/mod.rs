//! Persistence Adapters - File-based Listener State
//!
//! Implements the Repository port with an atomic JSON checkpoint per
//! network and an append-only JSONL dead-letter log. No database
//! dependency.

pub mod checkpoint;
pub mod dead_letter;
pub mod repository_impl;

pub use checkpoint::CheckpointStore;
pub use dead_letter::DeadLetterLog;
pub use repository_impl::FileRepository;
