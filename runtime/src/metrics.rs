//! Prometheus metrics for observability and monitoring.
//!
//! The controller records:
//! - Actions processed, by kind
//! - Requests issued, by trigger
//! - Stale results discarded
//! - Disposals
//! - Reducer execution time
//!
//! # Example
//!
//! ```rust,no_run
//! use request_state_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serves http://0.0.0.0:9090/metrics from the current tokio runtime
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global Prometheus recorder and renders the scrape payload.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is published on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and serve
    /// `GET /metrics` on the configured address.
    ///
    /// Must be called from within a tokio runtime; the listener runs as a task
    /// on it.
    ///
    /// # Errors
    ///
    /// Returns error if no tokio runtime is available, or if the exporter
    /// cannot be built (for example when the address cannot be bound).
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and succeeds without a handle or listener.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();

        let (recorder, exporter) = {
            let _guard = runtime.enter();
            PrometheusBuilder::new()
                .with_http_listener(self.addr)
                .set_buckets_for_metric(
                    Matcher::Suffix("duration_seconds".to_string()),
                    &[
                        0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
                    ],
                )
                .map_err(|e| MetricsError::Build(e.to_string()))?
                .build()
                .map_err(|e| MetricsError::Build(e.to_string()))?
        };
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        runtime.spawn(async move {
            // `ExporterError` does not implement `Debug`, so it cannot be logged.
            if exporter.await.is_err() {
                tracing::error!("Metrics listener stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics recorder installed - scrape at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Address the scrape endpoint listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "request_controller_actions_total",
        "Total number of actions processed by request controllers"
    );
    describe_counter!(
        "request_controller_requests_issued_total",
        "Total number of HTTP requests issued, labelled by trigger"
    );
    describe_counter!(
        "request_controller_stale_results_total",
        "Results discarded because a newer request superseded them"
    );
    describe_counter!(
        "request_controller_disposed_total",
        "Total number of disposed controllers"
    );
    describe_histogram!(
        "request_controller_reducer_duration_seconds",
        "Time taken to run the request reducer"
    );
}

/// Controller metrics recorder.
pub struct ControllerMetrics;

impl ControllerMetrics {
    /// Record an action processed by the reducer.
    pub fn record_action(kind: &'static str, duration: Duration) {
        counter!("request_controller_actions_total", "kind" => kind).increment(1);
        histogram!("request_controller_reducer_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a request handed to the HTTP client.
    pub fn record_issued(trigger: &'static str) {
        counter!("request_controller_requests_issued_total", "trigger" => trigger).increment(1);
    }

    /// Record a result that arrived for a superseded request.
    pub fn record_stale() {
        counter!("request_controller_stale_results_total").increment(1);
    }

    /// Record a disposal.
    pub fn record_disposed() {
        counter!("request_controller_disposed_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_metrics_server_requires_runtime() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(matches!(server.start(), Err(MetricsError::Install(_))));
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        ControllerMetrics::record_issued("dependencies");
        ControllerMetrics::record_action("observe", Duration::from_micros(20));
        ControllerMetrics::record_stale();

        // If another test installed the recorder first, the handle is None.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("request_controller_requests_issued_total"));
            assert!(rendered.contains("request_controller_actions_total"));
            assert!(rendered.contains("request_controller_stale_results_total"));
        }
    }
}
