//! Command Updater - Shell Command Asset Regeneration
//!
//! Runs the configured command through `sh -c` with the batch as a JSON
//! array on stdin. `NETWORK` and `EVENT_COUNT` are set in its
//! environment. A non-zero exit or a timeout fails the batch.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::domain::ContractEvent;
use crate::ports::AssetUpdater;

/// Bytes of stderr kept in the failure message.
const STDERR_TAIL: usize = 2_000;

/// Shell-command asset updater.
#[derive(Debug, Clone)]
pub struct CommandUpdater {
  command: String,
  network: String,
  timeout: Duration,
}

impl CommandUpdater {
  pub fn new(command: impl Into<String>, network: impl Into<String>, timeout: Duration) -> Self {
    Self {
      command: command.into(),
      network: network.into(),
      timeout,
    }
  }
}

#[async_trait]
impl AssetUpdater for CommandUpdater {
  #[instrument(skip_all, fields(events = events.len()))]
  async fn regenerate(&self, events: &[ContractEvent]) -> Result<()> {
    let payload = serde_json::to_vec(events).context("Failed to serialize event batch")?;

    let mut child = Command::new("sh")
      .arg("-c")
      .arg(&self.command)
      .env("NETWORK", &self.network)
      .env("EVENT_COUNT", events.len().to_string())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .with_context(|| format!("Failed to spawn asset update command `{}`", self.command))?;

    let stdin = child.stdin.take();
    let run = async move {
      if let Some(mut stdin) = stdin {
        // A command that ignores stdin may exit before reading it.
        if let Err(e) = stdin.write_all(&payload).await {
          debug!(error = %e, "Asset update command did not read stdin");
        }
      }
      child.wait_with_output().await
    };

    // Covers the stdin write too: a command that never reads a large
    // batch would otherwise block the pipeline.
    let output = tokio::time::timeout(self.timeout, run)
      .await
      .map_err(|_| anyhow!("asset update timed out after {:?}", self.timeout))?
      .context("Failed to wait for asset update command")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      bail!(
        "asset update exited with {}: {}",
        output.status,
        tail(stderr.trim(), STDERR_TAIL)
      );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
      debug!(output = %tail(stdout.trim(), STDERR_TAIL), "Asset update command output");
    }
    info!(events = events.len(), "Asset update command succeeded");
    Ok(())
  }

  fn name(&self) -> &'static str {
    "command"
  }
}

fn tail(text: &str, max: usize) -> &str {
  if text.len() <= max {
    return text;
  }
  let mut start = text.len() - max;
  while !text.is_char_boundary(start) {
    start += 1;
  }
  &text[start..]
}
