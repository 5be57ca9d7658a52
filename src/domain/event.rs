//! Contract event types.
//!
//! Decoded Su Squares events as they flow through catch-up, the live
//! feed and the confirmation queue. Adapters convert raw logs into these
//! types; nothing below this module knows about alloy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identity of a log: `<txHash>:<logIndex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Build an id from a transaction hash and the log's index in its block.
    pub fn new(tx_hash: &str, log_index: u64) -> Self {
        Self(format!("{}:{log_index}", tx_hash.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The contract event types the listener cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `SuMain.Personalized(uint256)`
    Personalized,
    /// `SuMain.Transfer(address,address,uint256)`
    Transfer,
    /// `SuSquaresUnderlay.PersonalizedUnderlay(uint256,bytes,string,string)`
    UnderlayPersonalized,
}

impl EventKind {
    pub const ALL: [Self; 3] = [
        Self::Personalized,
        Self::Transfer,
        Self::UnderlayPersonalized,
    ];

    /// Name of the deployed contract that emits this event.
    pub const fn contract(self) -> &'static str {
        match self {
            Self::Personalized | Self::Transfer => "SuMain",
            Self::UnderlayPersonalized => "SuSquaresUnderlay",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personalized => write!(f, "Personalized"),
            Self::Transfer => write!(f, "Transfer"),
            Self::UnderlayPersonalized => write!(f, "PersonalizedUnderlay"),
        }
    }
}

/// Decoded event arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SquareEvent {
    /// A square's main personalization (image, title, link) changed.
    Personalized { square: u32 },
    /// A square changed owner. Mints come from the zero address.
    Transfer { from: String, to: String, square: u32 },
    /// A square's underlay personalization changed.
    #[serde(rename_all = "camelCase")]
    UnderlayPersonalized {
        square: u32,
        /// RGB pixel data, 0x-prefixed hex.
        rgb_data: String,
        title: String,
        href: String,
    },
}

impl SquareEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Personalized { .. } => EventKind::Personalized,
            Self::Transfer { .. } => EventKind::Transfer,
            Self::UnderlayPersonalized { .. } => EventKind::UnderlayPersonalized,
        }
    }

    /// Square number (1..=10000) the event refers to.
    pub const fn square(&self) -> u32 {
        match self {
            Self::Personalized { square }
            | Self::Transfer { square, .. }
            | Self::UnderlayPersonalized { square, .. } => *square,
        }
    }
}

/// A decoded log with its chain position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    pub id: EventId,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: String,
    pub payload: SquareEvent,
}

impl ContractEvent {
    pub fn new(block_number: u64, log_index: u64, tx_hash: &str, payload: SquareEvent) -> Self {
        Self {
            id: EventId::new(tx_hash, log_index),
            block_number,
            log_index,
            tx_hash: tx_hash.to_lowercase(),
            payload,
        }
    }

    /// Chain order key: block number, then position within the block.
    pub const fn chain_position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// An event waiting in the confirmation queue.
#[derive(Debug, Clone)]
pub struct TrackedEvent {
    pub event: ContractEvent,
    pub first_seen_at: DateTime<Utc>,
    /// Arrival sequence number; breaks ties within a block.
    pub arrival: u64,
    /// Failed dispatch attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl TrackedEvent {
    /// Confirmations at the given chain height (0 if the head is behind).
    pub const fn confirmations(&self, head: u64) -> u64 {
        head.saturating_sub(self.event.block_number)
    }
}
