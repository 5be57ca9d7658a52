//! Listener Pipeline Use Case - Startup, Catch-up and Live Phases
//!
//! Lifecycle (one-way):
//! 1. Startup: load the checkpoint (corrupt → fallback start block) and
//!    report pending dead letters
//! 2. CatchUp: fetch history from checkpoint + 1 to the head at startup,
//!    record it as one batch, tick once
//! 3. Live: record feed events as they arrive; on every poll interval
//!    drain the feed, fetch the head and tick
//!
//! The live feed is opened by the caller before catch-up, so anything
//! that arrives meanwhile waits in the channel and is deduplicated by id
//! when the live phase starts.
//!
//! If the feed stops, the checkpoint is frozen at the last head known
//! to be covered, so the next start re-scans everything after it.

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::accumulator::EventAccumulator;
use super::catch_up::catch_up_missed_events;
use super::chunked_query::ChunkOptions;
use crate::domain::{EventSource, Phase, QueueSettings, RecordOutcome, TickReport};
use crate::error::{ListenerError, ListenerResult};
use crate::ports::{AssetUpdater, FeedMessage, LogSource, Repository, Telemetry};

/// Pipeline timing and fallbacks.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
  /// Interval between head polls and ticks.
  pub poll_interval: Duration,
  pub chunk: ChunkOptions,
  /// First block to scan when no usable checkpoint exists.
  pub fallback_start: u64,
}

/// What the catch-up phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpReport {
  pub from: u64,
  pub to: u64,
  /// Events returned by the historical queries.
  pub fetched: usize,
  /// Events that were new to the accumulator.
  pub tracked: usize,
  pub tick: TickReport,
}

/// The per-network listener: context object wiring source, accumulator
/// and telemetry together.
pub struct ListenerPipeline<S, U, R, T>
where
  S: LogSource,
  U: AssetUpdater,
  R: Repository,
  T: Telemetry,
{
  source: S,
  accumulator: EventAccumulator<U, R>,
  telemetry: T,
  options: PipelineOptions,
  phase: Phase,
  /// Head of the latest tick. The feed was drained after it was fetched,
  /// so every block up to it was covered while the feed was open.
  last_head: Option<u64>,
  feed_lost: bool,
}

impl<S, U, R, T> ListenerPipeline<S, U, R, T>
where
  S: LogSource,
  U: AssetUpdater,
  R: Repository,
  T: Telemetry,
{
  /// Startup phase.
  ///
  /// # Errors
  /// Repository failures other than checkpoint corruption.
  #[instrument(skip_all, fields(network = %network))]
  pub async fn start(
    network: &str,
    source: S,
    updater: U,
    repo: R,
    telemetry: T,
    settings: QueueSettings,
    options: PipelineOptions,
  ) -> ListenerResult<Self> {
    telemetry.phase_changed(Phase::Startup);
    info!(phase = %Phase::Startup, "Entering phase");

    let checkpoint = match repo.load_checkpoint(network).await {
      Ok(checkpoint) => checkpoint,
      Err(e @ ListenerError::CheckpointCorruption { .. }) => {
        warn!(
          error = %e,
          fallback_start = options.fallback_start,
          "Checkpoint unusable, falling back to start block"
        );
        None
      }
      Err(e) => return Err(e),
    };

    match repo.load_dead_letters(network).await {
      Ok(letters) if !letters.is_empty() => warn!(
        count = letters.len(),
        "Dead-lettered events are awaiting manual replay"
      ),
      Ok(_) => {}
      Err(e) => warn!(error = %e, "Failed to read dead-letter log"),
    }

    let accumulator = EventAccumulator::new(network, settings, checkpoint, updater, repo);

    Ok(Self {
      source,
      accumulator,
      telemetry,
      options,
      phase: Phase::Startup,
      last_head: None,
      feed_lost: false,
    })
  }

  pub const fn phase(&self) -> Phase {
    self.phase
  }

  pub const fn accumulator(&self) -> &EventAccumulator<U, R> {
    &self.accumulator
  }

  /// Whether a live subscription has closed.
  pub const fn feed_lost(&self) -> bool {
    self.feed_lost
  }

  /// First block the catch-up phase will scan.
  pub fn catch_up_start(&self) -> u64 {
    self
      .accumulator
      .checkpoint()
      .map_or(self.options.fallback_start, |checkpoint| checkpoint + 1)
  }

  /// CatchUp phase.
  ///
  /// # Errors
  /// `ListenerError::Connection` if the head cannot be fetched, or the
  /// first non range-limit query failure.
  pub async fn catch_up(&mut self) -> ListenerResult<CatchUpReport> {
    self.enter(Phase::CatchUp);

    let head = self.source.block_number().await.map_err(|e| {
      ListenerError::Connection(format!("failed to fetch head for catch-up: {e}"))
    })?;
    let from = self.catch_up_start();
    info!(from, to = head, "Catching up missed events");

    let telemetry = &self.telemetry;
    let events = catch_up_missed_events(&self.source, from, head, &self.options.chunk, |kind, p| {
      telemetry.chunk_completed(kind, p);
    })
    .await?;

    let fetched = events.len();
    let tracked = self.accumulator.record_batch(events);
    self.telemetry.events_recorded(EventSource::CatchUp, tracked);
    info!(fetched, tracked, "Catch-up batch recorded");

    // History up to `head` came from queries, not the feed.
    self.last_head = Some(head);
    let tick = self.tick(head).await;
    Ok(CatchUpReport {
      from,
      to: head,
      fetched,
      tracked,
      tick,
    })
  }

  /// Live phase. Runs until `shutdown` fires.
  pub async fn run(
    mut self,
    mut feed: mpsc::UnboundedReceiver<FeedMessage>,
    mut shutdown: broadcast::Receiver<()>,
  ) -> ListenerResult<()> {
    self.enter(Phase::Live);
    self.drain_feed(&mut feed);

    let mut interval = tokio::time::interval(self.options.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; catch-up just ticked.
    interval.tick().await;

    let mut feed_open = true;
    loop {
      tokio::select! {
        biased;

        _ = shutdown.recv() => {
          info!("Shutdown signal received, stopping listener");
          break;
        }

        _ = interval.tick() => {
          self.poll_draining(Some(&mut feed)).await;
        }

        message = feed.recv(), if feed_open => match message {
          Some(message) => self.handle_feed_message(message),
          None => {
            feed_open = false;
            if !self.feed_lost {
              self.lose_feed("all live subscriptions closed");
            }
          }
        },
      }
    }

    info!(
      checkpoint = ?self.accumulator.persisted_checkpoint(),
      pending = self.accumulator.pending(),
      "Listener stopped"
    );
    Ok(())
  }

  /// Record one message from the live feed.
  pub fn handle_feed_message(&mut self, message: FeedMessage) {
    match message {
      FeedMessage::Event(event) => {
        if self.accumulator.record(event) == RecordOutcome::Tracked {
          self.telemetry.events_recorded(EventSource::Live, 1);
        }
      }
      FeedMessage::Removed { id, block } => {
        debug!(event_id = %id, block, "Retracting reorged-out event");
        self.accumulator.retract(&id);
      }
      FeedMessage::Closed { kind, reason } => {
        self.lose_feed(&format!("{kind} subscription closed: {reason}"));
      }
    }
  }

  /// Fetch the head and tick. A failed fetch is reported, never fatal.
  pub async fn poll(&mut self) -> Option<TickReport> {
    self.poll_draining(None).await
  }

  /// Fetch the head, drain the feed, then tick. Draining after the fetch
  /// means a feed that closed before the head was known is seen before
  /// the checkpoint can move.
  async fn poll_draining(
    &mut self,
    feed: Option<&mut mpsc::UnboundedReceiver<FeedMessage>>,
  ) -> Option<TickReport> {
    let fetched = self.source.block_number().await;
    if let Some(feed) = feed {
      self.drain_feed(feed);
    }
    match fetched {
      Ok(head) => {
        let report = self.tick(head).await;
        self.last_head = Some(head);
        Some(report)
      }
      Err(failure) => {
        warn!(error = %failure, "Failed to fetch chain head");
        self.telemetry.head_poll_failed(&failure);
        None
      }
    }
  }

  async fn tick(&mut self, head: u64) -> TickReport {
    let report = self.accumulator.tick(head).await;
    self.telemetry.tick_completed(&report);
    report
  }

  /// Freeze the checkpoint where feed coverage is still certain and
  /// report the loss. Blocks past it are re-scanned on the next start.
  fn lose_feed(&mut self, reason: &str) {
    let err = ListenerError::Connection(reason.to_string());
    if self.feed_lost {
      error!(error = %err, "Another live subscription lost");
      return;
    }
    self.feed_lost = true;

    let frozen_at = self
      .last_head
      .unwrap_or_else(|| self.catch_up_start().saturating_sub(1));
    self.accumulator.freeze_checkpoint(frozen_at);
    self.telemetry.live_feed_lost(Some(frozen_at));
    error!(
      error = %err,
      frozen_at,
      "Live feed lost, checkpoint frozen; restart the process to resubscribe"
    );
  }

  fn drain_feed(&mut self, feed: &mut mpsc::UnboundedReceiver<FeedMessage>) {
    let mut drained = 0_usize;
    loop {
      match feed.try_recv() {
        Ok(message) => {
          self.handle_feed_message(message);
          drained += 1;
        }
        Err(TryRecvError::Disconnected) => {
          if !self.feed_lost {
            self.lose_feed("all live subscriptions closed");
          }
          break;
        }
        Err(TryRecvError::Empty) => break,
      }
    }
    if drained > 0 {
      debug!(drained, "Drained buffered feed messages");
    }
  }

  fn enter(&mut self, phase: Phase) {
    debug_assert!(phase >= self.phase, "phase transitions are one-way");
    self.phase = phase;
    self.telemetry.phase_changed(phase);
    info!(%phase, "Entering phase");
  }
}
