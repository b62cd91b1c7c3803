//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the controller components:
//! - Store actions and effect execution
//! - Ad request pipeline
//! - Watchdog expiries and cancel cycles
//! - Event bus observer failures
//!
//! # Example
//!
//! ```rust,no_run
//! use outstream_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

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
/// Installs the global recorder and renders the Prometheus text format for
/// whoever serves `/metrics` at `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address metrics are advertised on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// The advertised address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// succeeds without a handle and [`render`](Self::render) returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            // Configure histogram buckets for latency measurements
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - advertised at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
///
/// Called by [`MetricsServer::start`]; call it directly when installing a
/// different recorder.
pub fn register_metrics() {
    // Store Metrics
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, by effect type"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside reducers"
    );
    describe_counter!("store.shutdown.initiated", "Store shutdowns started");
    describe_counter!("store.shutdown.completed", "Store shutdowns that drained in time");
    describe_counter!("store.shutdown.timeout", "Store shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Ad Request Metrics
    describe_counter!(
        "ad_requests_started_total",
        "Total number of ad decision requests started, by origin"
    );
    describe_counter!(
        "ad_requests_rejected_total",
        "Total number of requestAd calls rejected because a request was in flight"
    );
    describe_counter!(
        "ad_request_failures_total",
        "Total number of ad decision requests that failed"
    );
    describe_histogram!(
        "ad_request_duration_seconds",
        "Time from request start to a resolved locator"
    );

    // Lifecycle Metrics
    describe_counter!(
        "ad_watchdog_expired_total",
        "Total number of watchdog expiries, by watchdog"
    );
    describe_counter!("ad_cancellations_total", "Total number of cancel cycles");
    describe_gauge!(
        "ad_consecutive_failures",
        "Consecutive failed ad requests since the last resolved locator"
    );

    // Event Bus Metrics
    describe_counter!(
        "event_bus_observer_failures_total",
        "Observer failures isolated by the event bus, by kind"
    );
}

/// Ad lifecycle metrics recorder.
pub struct AdMetrics;

impl AdMetrics {
    /// Record a decision request starting.
    pub fn record_request_started(origin: &'static str) {
        counter!("ad_requests_started_total", "origin" => origin).increment(1);
    }

    /// Record a requestAd call rejected with "already in flight".
    pub fn record_request_rejected() {
        counter!("ad_requests_rejected_total").increment(1);
    }

    /// Record a resolved locator and how long it took.
    pub fn record_request_resolved(duration: Duration) {
        histogram!("ad_request_duration_seconds").record(duration.as_secs_f64());
        gauge!("ad_consecutive_failures").set(0.0);
    }

    /// Record a failed decision request.
    pub fn record_request_failed(consecutive_failures: u32) {
        counter!("ad_request_failures_total").increment(1);
        gauge!("ad_consecutive_failures").set(f64::from(consecutive_failures));
    }

    /// Record a watchdog expiry.
    pub fn record_watchdog_expired(watchdog: &'static str) {
        counter!("ad_watchdog_expired_total", "watchdog" => watchdog).increment(1);
    }

    /// Record a completed cancel cycle.
    pub fn record_cancellation() {
        counter!("ad_cancellations_total").increment(1);
    }
}
