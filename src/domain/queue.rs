//! Confirmation queue - pending events ordered by chain position.
//!
//! Holds every event that has been seen but not yet handed downstream.
//! Events are keyed by `(block_number, arrival)` so iteration is always
//! in dispatch order: ascending block, ties broken by arrival. The queue
//! is pure state; the accumulator use case drives dispatch against it.
//!
//! Checkpoint rule: after each tick the checkpoint may move up to
//! `min(lowest pending block - 1, head - required_confirmations)`, and
//! never moves down. Once a ceiling is set (the live feed stopped
//! covering the chain) it never moves past it either.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

use super::event::{ContractEvent, EventId, TrackedEvent};

/// Queue tuning.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// Blocks required on top of an event's block before dispatch.
    pub required_confirmations: u64,
    /// Failed dispatch attempts before an event is given up on.
    pub max_dispatch_retries: u32,
    /// Pending age after which an unconfirmed event is evicted.
    pub max_event_age: Duration,
    /// How far below the checkpoint resolved ids are remembered.
    pub dedup_window: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            required_confirmations: 5,
            max_dispatch_retries: 5,
            max_event_age: Duration::hours(1),
            dedup_window: 10_000,
        }
    }
}

/// Result of offering an event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// New event, now pending.
    Tracked,
    /// Already pending.
    Duplicate,
    /// Already dispatched or dead-lettered.
    AlreadyResolved,
}

/// Snapshot for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub lowest_pending_block: Option<u64>,
    /// Blocks still to be mined before the lowest pending block is eligible.
    pub blocks_until_next: Option<u64>,
    pub checkpoint: Option<u64>,
}

/// Ordered set of pending events plus checkpoint bookkeeping.
#[derive(Debug)]
pub struct ConfirmationQueue {
    settings: QueueSettings,
    pending: BTreeMap<(u64, u64), TrackedEvent>,
    index: HashMap<EventId, (u64, u64)>,
    /// Ids already dispatched or dead-lettered, with their block.
    resolved: HashMap<EventId, u64>,
    next_arrival: u64,
    checkpoint: Option<u64>,
    /// Highest block the checkpoint may reach.
    ceiling: Option<u64>,
}

impl ConfirmationQueue {
    pub fn new(settings: QueueSettings, checkpoint: Option<u64>) -> Self {
        Self {
            settings,
            pending: BTreeMap::new(),
            index: HashMap::new(),
            resolved: HashMap::new(),
            next_arrival: 0,
            checkpoint,
            ceiling: None,
        }
    }

    pub const fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub const fn checkpoint(&self) -> Option<u64> {
        self.checkpoint
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.index.contains_key(id)
    }

    /// Track an event unless it is already pending or resolved.
    pub fn record(&mut self, event: ContractEvent, now: DateTime<Utc>) -> RecordOutcome {
        if self.index.contains_key(&event.id) {
            return RecordOutcome::Duplicate;
        }
        if self.resolved.contains_key(&event.id) {
            return RecordOutcome::AlreadyResolved;
        }

        let key = (event.block_number, self.next_arrival);
        self.next_arrival += 1;
        self.index.insert(event.id.clone(), key);
        self.pending.insert(
            key,
            TrackedEvent {
                event,
                first_seen_at: now,
                arrival: key.1,
                attempts: 0,
                last_error: None,
            },
        );
        RecordOutcome::Tracked
    }

    /// Lowest pending block, if it has enough confirmations at `head`.
    pub fn next_eligible_block(&self, head: u64) -> Option<u64> {
        let (&(block, _), _) = self.pending.first_key_value()?;
        (head.saturating_sub(block) >= self.settings.required_confirmations
            && head >= block)
            .then_some(block)
    }

    /// Events pending at `block`, in arrival order.
    pub fn events_at(&self, block: u64) -> Vec<ContractEvent> {
        self.pending
            .range((block, 0)..=(block, u64::MAX))
            .map(|(_, tracked)| tracked.event.clone())
            .collect()
    }

    /// Remove every pending event at `block` after a successful dispatch.
    pub fn mark_dispatched(&mut self, block: u64) -> Vec<TrackedEvent> {
        self.take_block(block, |_| true)
    }

    /// Count a failed dispatch against every event at `block`.
    ///
    /// Events that have now used up their retries are removed and
    /// returned; the rest stay pending.
    pub fn mark_failed(&mut self, block: u64, error: &str) -> Vec<TrackedEvent> {
        for (_, tracked) in self.pending.range_mut((block, 0)..=(block, u64::MAX)) {
            tracked.attempts += 1;
            tracked.last_error = Some(error.to_string());
        }
        let max = self.settings.max_dispatch_retries;
        self.take_block(block, |tracked| tracked.attempts >= max)
    }

    /// Whether any event is still pending at `block`.
    pub fn has_block(&self, block: u64) -> bool {
        self.pending
            .range((block, 0)..=(block, u64::MAX))
            .next()
            .is_some()
    }

    /// Evict unconfirmed events older than `max_event_age`.
    pub fn evict_stale(&mut self, head: u64, now: DateTime<Utc>) -> Vec<TrackedEvent> {
        let required = self.settings.required_confirmations;
        let max_age = self.settings.max_event_age;
        let stale: Vec<(u64, u64)> = self
            .pending
            .iter()
            .filter(|(_, t)| t.confirmations(head) < required && now - t.first_seen_at > max_age)
            .map(|(key, _)| *key)
            .collect();

        stale
            .into_iter()
            .filter_map(|key| self.remove(key))
            .collect()
    }

    pub const fn ceiling(&self) -> Option<u64> {
        self.ceiling
    }

    /// Cap the checkpoint at `block` from now on. A lower ceiling wins.
    pub fn freeze_at(&mut self, block: u64) {
        self.ceiling = Some(self.ceiling.map_or(block, |current| current.min(block)));
    }

    /// Drop a still-pending event whose log was removed by a reorg.
    ///
    /// The id is not remembered as resolved, so the same log mined again
    /// is tracked afresh.
    pub fn retract(&mut self, id: &EventId) -> Option<ContractEvent> {
        let key = self.index.remove(id)?;
        self.pending.remove(&key).map(|tracked| tracked.event)
    }

    /// Move the checkpoint forward if the confirmed, fully-handled
    /// prefix of the chain has grown. Returns the new value if it moved.
    pub fn advance_checkpoint(&mut self, head: u64) -> Option<u64> {
        let confirmed = head.checked_sub(self.settings.required_confirmations)?;
        let safe = match self.pending.first_key_value() {
            Some((&(block, _), _)) => block.checked_sub(1)?.min(confirmed),
            None => confirmed,
        };
        let safe = self.ceiling.map_or(safe, |ceiling| safe.min(ceiling));

        if self.checkpoint.is_some_and(|current| current >= safe) {
            return None;
        }
        self.checkpoint = Some(safe);

        let floor = safe.saturating_sub(self.settings.dedup_window);
        self.resolved.retain(|_, block| *block >= floor);
        Some(safe)
    }

    pub fn status(&self, head: u64) -> QueueStatus {
        let lowest = self.pending.first_key_value().map(|(&(block, _), _)| block);
        QueueStatus {
            pending: self.pending.len(),
            lowest_pending_block: lowest,
            blocks_until_next: lowest.map(|block| {
                (block + self.settings.required_confirmations).saturating_sub(head)
            }),
            checkpoint: self.checkpoint,
        }
    }

    fn take_block(
        &mut self,
        block: u64,
        predicate: impl Fn(&TrackedEvent) -> bool,
    ) -> Vec<TrackedEvent> {
        let keys: Vec<(u64, u64)> = self
            .pending
            .range((block, 0)..=(block, u64::MAX))
            .filter(|(_, tracked)| predicate(tracked))
            .map(|(key, _)| *key)
            .collect();

        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    fn remove(&mut self, key: (u64, u64)) -> Option<TrackedEvent> {
        let tracked = self.pending.remove(&key)?;
        self.index.remove(&tracked.event.id);
        self.resolved
            .insert(tracked.event.id.clone(), tracked.event.block_number);
        Some(tracked)
    }
}
