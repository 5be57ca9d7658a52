//! Asset Updater Adapters - Command and Webhook Targets
//!
//! Exactly one target is configured per process. `ConfiguredUpdater`
//! picks it from `UpdaterConfig` so the accumulator stays generic over
//! a single concrete type.

pub mod command;
pub mod webhook;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use command::CommandUpdater;
pub use webhook::WebhookUpdater;

use crate::config::UpdaterConfig;
use crate::domain::ContractEvent;
use crate::ports::AssetUpdater;

/// The updater selected by configuration.
pub enum ConfiguredUpdater {
  Command(CommandUpdater),
  Webhook(WebhookUpdater),
}

impl ConfiguredUpdater {
  /// Build the configured target for a network.
  ///
  /// # Errors
  /// Fails if the HTTP client cannot be built.
  pub fn from_config(config: &UpdaterConfig, network: &str) -> Result<Self> {
    Ok(match config {
      UpdaterConfig::Command {
        command,
        timeout_secs,
      } => Self::Command(CommandUpdater::new(
        command.clone(),
        network,
        Duration::from_secs(*timeout_secs),
      )),
      UpdaterConfig::Webhook { url, timeout_secs } => Self::Webhook(WebhookUpdater::new(
        url.clone(),
        network,
        Duration::from_secs(*timeout_secs),
      )?),
    })
  }
}

#[async_trait]
impl AssetUpdater for ConfiguredUpdater {
  async fn regenerate(&self, events: &[ContractEvent]) -> Result<()> {
    match self {
      Self::Command(updater) => updater.regenerate(events).await,
      Self::Webhook(updater) => updater.regenerate(events).await,
    }
  }

  fn name(&self) -> &'static str {
    match self {
      Self::Command(updater) => updater.name(),
      Self::Webhook(updater) => updater.name(),
    }
  }
}
