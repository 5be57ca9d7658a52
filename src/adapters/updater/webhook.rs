//! Webhook Updater - HTTP POST Asset Regeneration
//!
//! Posts `{ "network": ..., "events": [...] }` to the configured URL.
//! Any non-2xx response fails the batch.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::ContractEvent;
use crate::ports::AssetUpdater;

#[derive(Serialize)]
struct WebhookBody<'a> {
  network: &'a str,
  events: &'a [ContractEvent],
}

/// HTTP webhook asset updater.
pub struct WebhookUpdater {
  http: Client,
  url: String,
  network: String,
}

impl WebhookUpdater {
  /// Build the client with the request timeout.
  pub fn new(url: impl Into<String>, network: impl Into<String>, timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      url: url.into(),
      network: network.into(),
    })
  }
}

#[async_trait]
impl AssetUpdater for WebhookUpdater {
  #[instrument(skip_all, fields(events = events.len()))]
  async fn regenerate(&self, events: &[ContractEvent]) -> Result<()> {
    let body = WebhookBody {
      network: &self.network,
      events,
    };

    let response = self
      .http
      .post(&self.url)
      .json(&body)
      .send()
      .await
      .context("Asset update webhook request failed")?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      bail!("asset update webhook returned {status}: {}", text.trim());
    }

    info!(%status, events = events.len(), "Asset update webhook accepted batch");
    Ok(())
  }

  fn name(&self) -> &'static str {
    "webhook"
  }
}
