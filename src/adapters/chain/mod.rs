//! Chain Adapters - Su Squares Contracts via alloy-rs
//!
//! Provides on-chain access via alloy-rs 0.9 for:
//! - WebSocket provider connection and liveness check
//! - Deployment records and event decoding
//! - Ranged historical log queries
//! - Live log subscriptions

pub mod contracts;
pub mod log_source;
pub mod provider;
pub mod subscription;

pub use contracts::{ContractSet, DeploymentBook, DeploymentRecord};
pub use log_source::ChainLogSource;
pub use provider::{ChainProvider, WsProvider};
pub use subscription::{LiveFeed, abort_all, open_live_feed};
