//! Verification counters
//!
//! Two monotonic counters are exposed in OpenMetrics text format:
//! `log_index_verification_total` (cycles attempted) and
//! `log_index_verification_failure_total` (cycles that failed).

use crate::error::{MonitorError, Result};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;
use std::sync::atomic::Ordering;

/// Content type served with the encoded registry
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Counter registry shared by the monitoring loop and the metrics endpoint
#[derive(Debug)]
pub struct MonitorMetrics {
    registry: Registry,
    total: Counter,
    failure: Counter,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let total = Counter::default();
        let failure = Counter::default();
        registry.register(
            "log_index_verification",
            "Number of log index verification attempts",
            total.clone(),
        );
        registry.register(
            "log_index_verification_failure",
            "Number of failed log index verifications",
            failure.clone(),
        );
        Self {
            registry,
            total,
            failure,
        }
    }

    pub fn inc_total(&self) {
        self.total.inc();
    }

    pub fn inc_failure(&self) {
        self.failure.inc();
    }

    /// Current `(total, failure)` values
    pub fn totals(&self) -> (u64, u64) {
        (self.total.get(), self.failure.get())
    }

    /// Zero both counters. Only meaningful in tests.
    pub fn reset_for_testing(&self) {
        self.total.inner().store(0, Ordering::Relaxed);
        self.failure.inner().store(0, Ordering::Relaxed);
    }

    /// Render the registry in OpenMetrics text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)
            .map_err(|e| MonitorError::Server(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
