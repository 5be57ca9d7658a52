//! Asset Updater Port - Downstream Regeneration Trigger
//!
//! Confirmed events are handed to an external process that rebuilds the
//! site's square images and metadata. The listener treats it as opaque:
//! it accepts a batch and either succeeds or fails.

use async_trait::async_trait;

use crate::domain::ContractEvent;

/// Trait for downstream asset regeneration.
#[async_trait]
pub trait AssetUpdater: Send + Sync + 'static {
  /// Regenerate assets for a batch of confirmed events (one block's worth).
  ///
  /// # Errors
  /// Any error is counted as a failed attempt and retried on the next tick.
  async fn regenerate(&self, events: &[ContractEvent]) -> anyhow::Result<()>;

  /// Short name for logs.
  fn name(&self) -> &'static str;
}
