//! Listener error kinds.
//!
//! Startup and configuration failures are fatal. Range-limit errors are
//! absorbed by the chunked query helper, dispatch errors by the
//! accumulator's retry policy, and checkpoint corruption by falling
//! back to the configured start block.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::RpcFailure;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// Provider unreachable at startup, or the socket dropped later.
    #[error("connection error: {0}")]
    Connection(String),

    /// A query window was rejected as too large.
    #[error("range limit for blocks {from}..={to}: {source}")]
    RangeLimit {
        from: u64,
        to: u64,
        #[source]
        source: RpcFailure,
    },

    /// Any other provider failure during a range query.
    #[error("log query for blocks {from}..={to} failed: {source}")]
    Rpc {
        from: u64,
        to: u64,
        #[source]
        source: RpcFailure,
    },

    /// The downstream asset update rejected a batch.
    #[error("dispatch of block {block} failed: {reason}")]
    Dispatch { block: u64, reason: String },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Checkpoint file exists but cannot be used.
    #[error("checkpoint {path} is unreadable: {reason}")]
    CheckpointCorruption { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ListenerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type ListenerResult<T> = Result<T, ListenerError>;
