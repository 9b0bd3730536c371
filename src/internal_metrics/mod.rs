//! # Internal Metrics Module
//!
//! Collection and exposure of application metrics.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: The entry point for initializing the metrics system.
//!   It installs the Prometheus recorder when metrics are enabled and hands
//!   back the `PrometheusHandle` the HTTP surface renders on `/metrics`.
//!
//! - **`Metrics`**: A lightweight, cloneable struct that serves as the public
//!   API for the rest of the application to interact with the metrics system.

use crate::config::MetricsConfig;
use crate::core::Channel;
use metrics::{Counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::error;

/// The public API for the metrics system.
///
/// This struct holds cloneable handles to the metrics collectors.
#[derive(Clone)]
pub struct Metrics {
    pub alerts_received_total: Counter,
    pub alerts_rejected_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    ///
    /// Without an installed recorder every handle is a no-op, which is what
    /// tests and metrics-disabled deployments get.
    pub fn new() -> Self {
        metrics::describe_counter!("alerts_received_total", Unit::Count, "Total number of valid alert requests accepted for dispatch.");
        metrics::describe_counter!("alerts_rejected_total", Unit::Count, "Total number of alert requests rejected by validation.");
        metrics::describe_counter!("alert_deliveries_total", Unit::Count, "Channel delivery attempts, labeled by channel and outcome.");

        Self {
            alerts_received_total: metrics::counter!("alerts_received_total"),
            alerts_rejected_total: metrics::counter!("alerts_rejected_total"),
        }
    }

    /// Counts one channel attempt.
    pub fn record_delivery(&self, channel: Channel, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        metrics::counter!(
            "alert_deliveries_total",
            "channel" => channel.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system.
    ///
    /// Returns the `Metrics` handle and, when metrics are enabled and the
    /// recorder could be installed, the handle used to render `/metrics`.
    pub fn build(self) -> (Metrics, Option<PrometheusHandle>) {
        if !self.config.enabled {
            return (Metrics::new(), None);
        }

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => (Metrics::new(), Some(handle)),
            Err(e) => {
                error!("Failed to install Prometheus recorder: {}", e);
                (Metrics::new(), None)
            }
        }
    }
}
