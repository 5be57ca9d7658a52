//! Prometheus Telemetry - `Telemetry` Port over Metrics and Health
//!
//! Translates pipeline progress into metric updates and readiness
//! flags.

use std::sync::Arc;

use super::health::HealthState;
use super::prometheus::{ListenerMetrics, to_gauge};
use crate::domain::{ChunkProgress, EventKind, EventSource, Phase, RpcFailure, TickReport};
use crate::ports::Telemetry;

/// Metrics-backed telemetry.
#[derive(Clone)]
pub struct MetricsTelemetry {
    metrics: Arc<ListenerMetrics>,
    health: HealthState,
}

impl MetricsTelemetry {
    pub fn new(metrics: Arc<ListenerMetrics>, health: HealthState) -> Self {
        Self { metrics, health }
    }
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl Telemetry for MetricsTelemetry {
    fn phase_changed(&self, phase: Phase) {
        if phase == Phase::Live {
            self.health.set_live();
        }
    }

    fn chunk_completed(&self, _kind: EventKind, progress: &ChunkProgress) {
        self.metrics.chunk_queries.with_label_values(&["ok"]).inc();
        self.metrics
            .chunk_queries
            .with_label_values(&["range_limit"])
            .inc_by(progress.rejected);
        self.metrics.chunk_step.set(to_gauge(progress.step));
    }

    fn events_recorded(&self, source: EventSource, tracked: usize) {
        self.metrics
            .recorded_events
            .with_label_values(&[source.label()])
            .inc_by(count(tracked));
    }

    fn tick_completed(&self, report: &TickReport) {
        self.metrics.dispatched_events.inc_by(count(report.dispatched));
        self.metrics
            .dispatch_failures
            .inc_by(count(report.failed_dispatches));
        self.metrics
            .dead_lettered_events
            .with_label_values(&["failed"])
            .inc_by(count(report.exhausted));
        self.metrics
            .dead_lettered_events
            .with_label_values(&["stale"])
            .inc_by(count(report.stale));
        self.metrics
            .observe_status(report.head, &report.status, report.persisted_checkpoint);
        self.health.set_head_ok(true);
    }

    fn head_poll_failed(&self, _failure: &RpcFailure) {
        self.health.set_head_ok(false);
    }

    fn live_feed_lost(&self, _frozen_at: Option<u64>) {
        self.health.set_feed_lost();
    }
}
