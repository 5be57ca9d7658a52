//! Health Check Server - Liveness, Readiness and Metrics
//!
//! Exposes /live, /ready and /metrics via axum 0.7. Readiness requires
//! the pipeline to be in its live phase with a successful last head
//! poll and an intact live feed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use super::prometheus::ListenerMetrics;

/// Shared health flags, flipped by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    /// Catch-up finished and the live loop is running.
    pub live: Arc<AtomicBool>,
    /// The last head poll succeeded.
    pub head_ok: Arc<AtomicBool>,
    /// A live subscription closed; cleared only by a restart.
    pub feed_lost: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live(&self) {
        self.live.store(true, Ordering::Relaxed);
        self.head_ok.store(true, Ordering::Relaxed);
    }

    pub fn set_head_ok(&self, ok: bool) {
        self.head_ok.store(ok, Ordering::Relaxed);
    }

    pub fn set_feed_lost(&self) {
        self.feed_lost.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.live.load(Ordering::Relaxed)
            && self.head_ok.load(Ordering::Relaxed)
            && !self.feed_lost.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct ServerState {
    health: HealthState,
    metrics: Arc<ListenerMetrics>,
}

/// Axum server for probes and the Prometheus scrape endpoint.
pub struct HealthServer {
    health: HealthState,
    metrics: Arc<ListenerMetrics>,
    bind_address: String,
}

impl HealthServer {
    pub fn new(health: HealthState, metrics: Arc<ListenerMetrics>, bind_address: String) -> Self {
        Self {
            health,
            metrics,
            bind_address,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/metrics", get(Self::metrics))
            .with_state(ServerState {
                health: self.health.clone(),
                metrics: Arc::clone(&self.metrics),
            })
    }

    /// Serve until the shutdown signal fires.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("Health and metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<ServerState>) -> impl IntoResponse {
        if state.health.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
        state.metrics.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_only_when_live_and_head_ok() {
        let health = HealthState::new();
        assert!(!health.is_ready());

        health.set_live();
        assert!(health.is_ready());

        health.set_head_ok(false);
        assert!(!health.is_ready());
    }

    #[test]
    fn test_lost_feed_stays_not_ready() {
        let health = HealthState::new();
        health.set_live();
        health.set_feed_lost();
        assert!(!health.is_ready());

        health.set_head_ok(true);
        assert!(!health.is_ready());
    }

    #[tokio::test]
    async fn test_serves_probes_and_metrics() {
        let health = HealthState::new();
        let metrics = Arc::new(ListenerMetrics::new().unwrap());
        metrics.head_block.set(42);
        let server = HealthServer::new(health.clone(), metrics, "127.0.0.1:0".into());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let ready = client.get(format!("http://{addr}/ready")).send().await.unwrap();
        assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        health.set_live();
        let ready = client.get(format!("http://{addr}/ready")).send().await.unwrap();
        assert_eq!(ready.status(), reqwest::StatusCode::OK);

        let body = client
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("su_listener_head_block 42"));
    }
}
