//! Configuration Module - Environment-driven Listener Configuration
//!
//! Everything comes from environment variables, optionally seeded by a
//! TOML file of per-network profiles (`CONFIG_PATH`). Contract addresses
//! are never configured here: they come from the deployment records.

pub mod loader;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{QueueSettings, StepBounds};

/// Top-level listener configuration, validated at startup.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
  /// Chain connection and confirmation policy.
  pub network: NetworkConfig,
  /// Directory holding `<network>.json` deployment records.
  pub deployments_dir: PathBuf,
  /// Directory for checkpoints and dead letters.
  pub data_dir: PathBuf,
  /// Downstream asset regeneration target.
  pub updater: UpdaterConfig,
  /// Retry and retention limits for pending events.
  pub queue: QueueConfig,
  /// Chunked historical query tuning.
  pub chunk: ChunkConfig,
  /// Metrics/health bind address; `None` disables the server.
  pub metrics_addr: Option<String>,
  /// Logging setup.
  pub log: LogConfig,
}

/// Chain-specific settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
  /// Network name (`sunet`, `sepolia`, `mainnet`, ...).
  pub name: String,
  /// WebSocket RPC endpoint.
  pub rpc_ws_url: String,
  /// Blocks required on top of an event before dispatch.
  pub required_confirmations: u64,
  /// Interval between head polls / ticks (milliseconds).
  pub poll_interval_ms: u64,
  /// Catch-up start when no checkpoint exists.
  pub start_block: Option<u64>,
}

impl NetworkConfig {
  pub const fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }
}

/// Where confirmed batches are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdaterConfig {
  /// Shell command receiving the batch as JSON on stdin.
  Command { command: String, timeout_secs: u64 },
  /// HTTP endpoint receiving the batch as a JSON POST.
  Webhook { url: String, timeout_secs: u64 },
}

/// Pending-event limits.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
  /// Failed dispatch attempts before an event is dead-lettered.
  pub max_dispatch_retries: u32,
  /// Seconds an event may stay unconfirmed before it is evicted.
  pub max_event_age_secs: u64,
}

impl QueueConfig {
  /// Queue settings for the given confirmation depth.
  pub fn settings(&self, required_confirmations: u64) -> QueueSettings {
    QueueSettings {
      required_confirmations,
      max_dispatch_retries: self.max_dispatch_retries,
      max_event_age: chrono::Duration::seconds(
        i64::try_from(self.max_event_age_secs).unwrap_or(i64::MAX),
      ),
      ..QueueSettings::default()
    }
  }
}

/// Chunked query tuning.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
  /// Window size bounds.
  pub bounds: StepBounds,
  /// Pause before retrying a rejected window (milliseconds).
  pub backoff_ms: u64,
}

impl Default for ChunkConfig {
  fn default() -> Self {
    Self {
      bounds: StepBounds::default(),
      backoff_ms: default_backoff_ms(),
    }
  }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  /// Human-readable, coloured by severity.
  Pretty,
  /// One JSON object per line.
  Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
  /// Default filter when `RUST_LOG` is unset.
  pub level: String,
  pub format: LogFormat,
}

/// Optional TOML profile file: `[networks.<name>]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFile {
  #[serde(default)]
  pub networks: HashMap<String, NetworkProfile>,
}

/// Per-network defaults; environment variables override each field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkProfile {
  pub rpc_ws_url: Option<String>,
  pub required_confirmations: Option<u64>,
  pub poll_interval_ms: Option<u64>,
  pub start_block: Option<u64>,
}

// Default value functions

pub(crate) const fn default_required_confirmations() -> u64 {
  5
}

pub(crate) const fn default_poll_interval_ms() -> u64 {
  12_000
}

pub(crate) const fn default_max_dispatch_retries() -> u32 {
  5
}

pub(crate) const fn default_max_event_age_secs() -> u64 {
  3_600
}

pub(crate) const fn default_updater_timeout_secs() -> u64 {
  300
}

pub(crate) const fn default_backoff_ms() -> u64 {
  1_000
}
