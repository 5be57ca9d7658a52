//! Dead-Letter Log - Append-only JSONL of Abandoned Events
//!
//! Events that exhausted their dispatch retries, or never confirmed
//! before going stale, are appended to `<data>/<network>/dead-letter.jsonl`.
//! Each line is a self-contained record so an operator can replay them
//! by hand.

use std::path::PathBuf;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::error::{ListenerError, ListenerResult};
use crate::ports::DeadLetter;

const DEAD_LETTER_FILE: &str = "dead-letter.jsonl";

/// Append-only JSONL dead-letter writer.
pub struct DeadLetterLog {
    data_dir: PathBuf,
}

impl DeadLetterLog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self, network: &str) -> PathBuf {
        self.data_dir.join(network).join(DEAD_LETTER_FILE)
    }

    /// Append one record.
    #[instrument(skip(self, letter), fields(event_id = %letter.event.id, reason = letter.reason.label()))]
    pub async fn append(&self, network: &str, letter: &DeadLetter) -> ListenerResult<()> {
        let path = self.path(network);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut json = serde_json::to_string(letter)
            .map_err(|e| ListenerError::Io(std::io::Error::other(e)))?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Load every record; malformed lines are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn load_all(&self, network: &str) -> ListenerResult<Vec<DeadLetter>> {
        let path = self.path(network);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        let mut letters = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeadLetter>(line) {
                Ok(letter) => letters.push(letter),
                Err(e) => warn!(
                    file = %path.display(),
                    error = %e,
                    "Skipping malformed dead-letter record"
                ),
            }
        }

        info!(count = letters.len(), "Loaded dead-letter records");
        Ok(letters)
    }
}
