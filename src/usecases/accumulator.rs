//! Event Accumulator Use Case - Confirmation Tracking and Dispatch
//!
//! Owns the confirmation queue and drives it on every tick:
//! 1. Dispatch eligible blocks in ascending order, one downstream call
//!    per block
//! 2. Dead-letter events that used up their retries or went stale
//! 3. Advance and persist the checkpoint
//!
//! A failed block stops dispatch for the tick so later blocks never
//! overtake it, unless its events were just dead-lettered.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
  ConfirmationQueue, ContractEvent, EventId, QueueSettings, QueueStatus, RecordOutcome, TickReport,
  TrackedEvent,
};
use crate::error::ListenerError;
use crate::ports::{AssetUpdater, DeadLetter, DeadLetterReason, Repository};

/// Pending-event tracker with downstream dispatch and checkpointing.
pub struct EventAccumulator<U: AssetUpdater, R: Repository> {
  network: String,
  queue: ConfirmationQueue,
  updater: U,
  repo: R,
  /// Last checkpoint written to disk.
  persisted: Option<u64>,
}

impl<U: AssetUpdater, R: Repository> EventAccumulator<U, R> {
  /// Create an accumulator resuming from a persisted checkpoint.
  pub fn new(
    network: impl Into<String>,
    settings: QueueSettings,
    checkpoint: Option<u64>,
    updater: U,
    repo: R,
  ) -> Self {
    Self {
      network: network.into(),
      queue: ConfirmationQueue::new(settings, checkpoint),
      updater,
      repo,
      persisted: checkpoint,
    }
  }

  /// Current in-memory checkpoint.
  pub const fn checkpoint(&self) -> Option<u64> {
    self.queue.checkpoint()
  }

  pub const fn persisted_checkpoint(&self) -> Option<u64> {
    self.persisted
  }

  pub fn pending(&self) -> usize {
    self.queue.len()
  }

  pub fn status(&self, head: u64) -> QueueStatus {
    self.queue.status(head)
  }

  /// Track an event. Re-delivery of a known id is a no-op.
  pub fn record(&mut self, event: ContractEvent) -> RecordOutcome {
    self.record_at(event, Utc::now())
  }

  pub fn record_at(&mut self, event: ContractEvent, now: DateTime<Utc>) -> RecordOutcome {
    let id = event.id.clone();
    let block = event.block_number;
    let kind = event.payload.kind();
    let outcome = self.queue.record(event, now);
    match outcome {
      RecordOutcome::Tracked => debug!(event_id = %id, block, %kind, "Event recorded"),
      RecordOutcome::Duplicate | RecordOutcome::AlreadyResolved => {
        debug!(event_id = %id, block, ?outcome, "Ignoring re-delivered event");
      }
    }
    outcome
  }

  /// Forget a pending event whose log was reorged out. Returns whether
  /// it was still pending.
  pub fn retract(&mut self, id: &EventId) -> bool {
    match self.queue.retract(id) {
      Some(event) => {
        warn!(event_id = %id, block = event.block_number, "Dropped reorged-out pending event");
        true
      }
      None => {
        debug!(event_id = %id, "Removed log was not pending");
        false
      }
    }
  }

  /// Never let the checkpoint pass `block` again.
  pub fn freeze_checkpoint(&mut self, block: u64) {
    self.queue.freeze_at(block);
    warn!(ceiling = ?self.queue.ceiling(), "Checkpoint frozen");
  }

  /// Track a batch in order. Returns how many were new.
  pub fn record_batch(&mut self, events: impl IntoIterator<Item = ContractEvent>) -> usize {
    let now = Utc::now();
    events
      .into_iter()
      .map(|event| self.record_at(event, now))
      .filter(|outcome| *outcome == RecordOutcome::Tracked)
      .count()
  }

  /// Run one confirmation pass at chain height `head`.
  pub async fn tick(&mut self, head: u64) -> TickReport {
    self.tick_at(head, Utc::now()).await
  }

  #[instrument(skip(self, now), fields(network = %self.network))]
  pub async fn tick_at(&mut self, head: u64, now: DateTime<Utc>) -> TickReport {
    let mut report = TickReport {
      head,
      dispatched: 0,
      failed_dispatches: 0,
      exhausted: 0,
      stale: 0,
      checkpoint_saved: None,
      persisted_checkpoint: self.persisted,
      status: self.queue.status(head),
    };

    while let Some(block) = self.queue.next_eligible_block(head) {
      let events = self.queue.events_at(block);

      match self.updater.regenerate(&events).await {
        Ok(()) => {
          let done = self.queue.mark_dispatched(block);
          report.dispatched += done.len();
          info!(
            block,
            events = done.len(),
            updater = self.updater.name(),
            "Dispatched confirmed events"
          );
        }
        Err(e) => {
          report.failed_dispatches += 1;
          let err = ListenerError::Dispatch {
            block,
            reason: format!("{e:#}"),
          };
          let reason = err.to_string();
          let exhausted = self.queue.mark_failed(block, &reason);

          if exhausted.is_empty() {
            warn!(error = %err, "Dispatch failed, retrying next tick");
            break;
          }

          error!(error = %err, events = exhausted.len(), "Dispatch retries exhausted, dead-lettering");
          report.exhausted += exhausted.len();
          for tracked in exhausted {
            let reason = DeadLetterReason::Failed {
              attempts: tracked.attempts,
              last_error: tracked.last_error.clone().unwrap_or_default(),
            };
            self.dead_letter(tracked, reason, now).await;
          }

          if self.queue.has_block(block) {
            break;
          }
        }
      }
    }

    let stale = self.queue.evict_stale(head, now);
    report.stale = stale.len();
    for tracked in stale {
      let age_secs = (now - tracked.first_seen_at).num_seconds();
      warn!(
        event_id = %tracked.event.id,
        block = tracked.event.block_number,
        confirmations = tracked.confirmations(head),
        age_secs,
        "Evicting stale unconfirmed event"
      );
      self.dead_letter(tracked, DeadLetterReason::Stale { age_secs }, now).await;
    }

    self.queue.advance_checkpoint(head);
    report.checkpoint_saved = self.persist_checkpoint().await;
    report.persisted_checkpoint = self.persisted;

    report.status = self.queue.status(head);
    debug!(
      pending = report.status.pending,
      lowest_pending = ?report.status.lowest_pending_block,
      blocks_until_next = ?report.status.blocks_until_next,
      checkpoint = ?report.status.checkpoint,
      "Queue status"
    );
    report
  }

  /// Write the checkpoint if it moved past the persisted value.
  async fn persist_checkpoint(&mut self) -> Option<u64> {
    let checkpoint = self.queue.checkpoint()?;
    if self.persisted.is_some_and(|saved| saved >= checkpoint) {
      return None;
    }

    match self.repo.save_checkpoint(&self.network, checkpoint).await {
      Ok(()) => {
        info!(block = checkpoint, "Checkpoint advanced");
        self.persisted = Some(checkpoint);
        Some(checkpoint)
      }
      Err(e) => {
        error!(error = %e, block = checkpoint, "Failed to save checkpoint, retrying next tick");
        None
      }
    }
  }

  async fn dead_letter(&self, tracked: TrackedEvent, reason: DeadLetterReason, now: DateTime<Utc>) {
    let letter = DeadLetter {
      event: tracked.event,
      reason,
      recorded_at: now,
    };
    if let Err(e) = self.repo.append_dead_letter(&self.network, &letter).await {
      error!(
        error = %e,
        event_id = %letter.event.id,
        "Failed to write dead letter"
      );
    }
  }
}
