//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSocket RPC, file I/O, child processes,
//! HTTP). Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: Su Squares contracts via alloy-rs (queries, subscriptions)
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: checkpoint and dead-letter files
//! - `updater`: downstream asset regeneration (command or webhook)

pub mod chain;
pub mod metrics;
pub mod persistence;
pub mod updater;
