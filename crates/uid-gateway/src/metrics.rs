//! Prometheus metrics exporter
//!
//! Serves the gateway counters over HTTP for Prometheus scraping.

use crate::observability::{Counter, GatewayMetrics};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Prometheus metrics in text format
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetrics {
    /// Metrics content in Prometheus text format
    pub content: String,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a gauge metric
    fn add_metric(&mut self, name: &str, value: impl std::fmt::Display, help: &str) {
        self.content.push_str(&format!("# HELP {} {}\n", name, help));
        self.content.push_str(&format!("# TYPE {} gauge\n", name));
        self.content.push_str(&format!("{} {}\n", name, value));
    }

    /// Add a counter metric
    fn add_counter(&mut self, name: &str, value: impl std::fmt::Display, help: &str) {
        self.content.push_str(&format!("# HELP {} {}\n", name, help));
        self.content.push_str(&format!("# TYPE {} counter\n", name));
        self.content.push_str(&format!("{} {}\n", name, value));
    }
}

/// Prometheus name for a gateway counter
fn metric_name(counter: Counter) -> String {
    format!("uid_gateway_{}_total", counter.name().replace('-', "_"))
}

/// Metrics server state
#[derive(Clone)]
pub struct MetricsState {
    metrics: Arc<GatewayMetrics>,
    start_time: SystemTime,
}

impl MetricsState {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            metrics,
            start_time: SystemTime::now(),
        }
    }

    /// Collect all metrics
    fn collect_metrics(&self) -> PrometheusMetrics {
        let mut out = PrometheusMetrics::new();

        for counter in Counter::ALL {
            out.add_counter(&metric_name(counter), self.metrics.get(counter), counter.help());
        }

        out.add_metric(
            "uid_gateway_queue_depth",
            self.metrics.queue_depth(),
            "Accounting events waiting to be batched",
        );

        let uptime = self.start_time.elapsed().unwrap_or_default().as_secs();
        out.add_counter("uid_gateway_uptime_seconds", uptime, "Gateway uptime in seconds");

        out
    }
}

/// Metrics endpoint handler
async fn metrics_handler(State(state): State<MetricsState>) -> Response {
    let metrics = state.collect_metrics();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics.content,
    )
        .into_response()
}

/// Create metrics HTTP router
pub fn create_metrics_server(metrics: Arc<GatewayMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(MetricsState::new(metrics))
}

/// Serve metrics on `listener` until `cancel` fires
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<GatewayMetrics>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    tracing::info!("Metrics server listening on {}", listener.local_addr()?);

    axum::serve(listener, create_metrics_server(metrics))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
