//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use cases require from the
//! outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `LogSource`: chain head and ranged log queries
//! - `AssetUpdater`: downstream asset regeneration trigger
//! - `Repository`: checkpoint and dead-letter persistence
//! - `Telemetry`: pipeline progress hooks for metrics and health

pub mod asset_updater;
pub mod log_source;
pub mod repository;
pub mod telemetry;

pub use asset_updater::AssetUpdater;
pub use log_source::{FeedMessage, LogSource};
pub use repository::{DeadLetter, DeadLetterReason, Repository};
pub use telemetry::{NoTelemetry, Telemetry};
