//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics plus /live and /ready probes, served together by
//! axum 0.7 when a metrics address is configured.

pub mod health;
pub mod prometheus;
pub mod telemetry;

pub use health::{HealthServer, HealthState};
pub use prometheus::ListenerMetrics;
pub use telemetry::MetricsTelemetry;
