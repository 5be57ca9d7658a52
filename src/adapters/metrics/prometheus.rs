//! Prometheus Metrics Registry - Listener Observability
//!
//! All metrics are prefixed `su_listener_`. The pipeline updates them
//! after every record and tick; the health server renders them on
//! `/metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::QueueStatus;

/// Centralized Prometheus metrics for the listener.
pub struct ListenerMetrics {
    registry: Registry,
    /// Last chain head observed.
    pub head_block: IntGauge,
    /// Last persisted checkpoint.
    pub checkpoint_block: IntGauge,
    /// Events waiting for confirmations or retry.
    pub pending_events: IntGauge,
    /// Events accepted into the queue, by source (`catch_up` / `live`).
    pub recorded_events: IntCounterVec,
    /// Events handed downstream successfully.
    pub dispatched_events: IntCounter,
    /// Failed downstream calls.
    pub dispatch_failures: IntCounter,
    /// Events given up on, by reason (`failed` / `stale`).
    pub dead_lettered_events: IntCounterVec,
    /// Historical query windows, by outcome (`ok` / `range_limit`).
    pub chunk_queries: IntCounterVec,
    /// Current chunked query window size.
    pub chunk_step: IntGauge,
}

impl ListenerMetrics {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let head_block = IntGauge::new("su_listener_head_block", "Last observed chain head")?;
        let checkpoint_block = IntGauge::new(
            "su_listener_checkpoint_block",
            "Last processed block persisted to disk",
        )?;
        let pending_events = IntGauge::new(
            "su_listener_pending_events",
            "Events waiting for confirmations or retry",
        )?;
        let recorded_events = IntCounterVec::new(
            Opts::new("su_listener_recorded_events_total", "Events accepted into the queue"),
            &["source"],
        )?;
        let dispatched_events = IntCounter::new(
            "su_listener_dispatched_events_total",
            "Events dispatched to the asset updater",
        )?;
        let dispatch_failures = IntCounter::new(
            "su_listener_dispatch_failures_total",
            "Failed asset updater calls",
        )?;
        let dead_lettered_events = IntCounterVec::new(
            Opts::new(
                "su_listener_dead_lettered_events_total",
                "Events written to the dead-letter log",
            ),
            &["reason"],
        )?;
        let chunk_queries = IntCounterVec::new(
            Opts::new("su_listener_chunk_queries_total", "Historical log query windows"),
            &["outcome"],
        )?;
        let chunk_step = IntGauge::new(
            "su_listener_chunk_step_blocks",
            "Current historical query window size",
        )?;

        registry.register(Box::new(head_block.clone()))?;
        registry.register(Box::new(checkpoint_block.clone()))?;
        registry.register(Box::new(pending_events.clone()))?;
        registry.register(Box::new(recorded_events.clone()))?;
        registry.register(Box::new(dispatched_events.clone()))?;
        registry.register(Box::new(dispatch_failures.clone()))?;
        registry.register(Box::new(dead_lettered_events.clone()))?;
        registry.register(Box::new(chunk_queries.clone()))?;
        registry.register(Box::new(chunk_step.clone()))?;

        Ok(Self {
            registry,
            head_block,
            checkpoint_block,
            pending_events,
            recorded_events,
            dispatched_events,
            dispatch_failures,
            dead_lettered_events,
            chunk_queries,
            chunk_step,
        })
    }

    /// Mirror a queue snapshot and the on-disk checkpoint into the gauges.
    pub fn observe_status(&self, head: u64, status: &QueueStatus, persisted: Option<u64>) {
        self.head_block.set(to_gauge(head));
        self.pending_events
            .set(i64::try_from(status.pending).unwrap_or(i64::MAX));
        if let Some(checkpoint) = persisted {
            self.checkpoint_block.set(to_gauge(checkpoint));
        }
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub(crate) fn to_gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
