//! Prometheus metrics for the registration workflow.
//!
//! Counters:
//! - `rollcall_registrations_total{operation, outcome}`: every engine call, by result
//! - `rollcall_cascade_rejections_total`: pending registrations rejected by quota fills
//! - `rollcall_retry_*_total`: transient-conflict retries
//! - `rollcall_http_requests_total{method, status}`: requests served by the HTTP layer
//!
//! # Example
//!
//! ```rust,no_run
//! use rollcall_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Serve `exporter.render()` from a /metrics endpoint
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rollcall_core::error::{Operation, WorkflowError};
use thiserror::Error;

/// Name of the HTTP request counter, incremented by the web layer.
pub const HTTP_REQUESTS_TOTAL: &str = "rollcall_http_requests_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders the scrape payload.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe every metric and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if a recorder cannot be installed. A recorder that is
    /// already installed (e.g. by another test) is not an error.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                register_metrics();
                tracing::info!("Prometheus recorder installed");
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

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "rollcall_registrations_total",
        "Workflow operations by operation and outcome"
    );
    describe_counter!(
        "rollcall_cascade_rejections_total",
        "Pending registrations rejected because their event filled up"
    );
    describe_counter!(
        "rollcall_retry_attempts_total",
        "Operations retried after a transient store conflict"
    );
    describe_counter!(
        "rollcall_retry_successes_total",
        "Operations that succeeded after at least one retry"
    );
    describe_counter!(
        "rollcall_retry_exhausted_total",
        "Operations that still conflicted after the last retry"
    );
    describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests by method and status");
}

/// Workflow metrics recorder.
pub struct WorkflowMetrics;

impl WorkflowMetrics {
    /// Record the result of one engine call.
    pub fn record_outcome<T>(
        operation: Operation,
        result: &Result<T, WorkflowError>,
        success: &'static str,
    ) {
        let outcome = match result {
            Ok(_) => success,
            Err(err) => err.code(),
        };
        counter!(
            "rollcall_registrations_total",
            "operation" => operation.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record registrations rejected by a quota-fill cascade.
    pub fn record_cascade(rejected: u64) {
        if rejected > 0 {
            counter!("rollcall_cascade_rejections_total").increment(rejected);
        }
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("rollcall_retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("rollcall_retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("rollcall_retry_exhausted_total").increment(1);
    }
}
