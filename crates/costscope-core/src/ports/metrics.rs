//! Metric sink port.
//!
//! Implementations: `costscope-web` (Prometheus registry) and
//! [`InMemorySink`](crate::metrics::InMemorySink).

use std::sync::Arc;

use crate::metrics::{Counter, Gauge, Labels, RunningGauge};

/// One value reported by a [`GaugeObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub labels: Labels,
    pub value: f64,
}

/// Callback invoked by the sink at export time.
pub trait GaugeObserver: Send + Sync {
    fn observe(&self) -> Vec<Observation>;
}

/// Telemetry pipeline. Shared by every detector and scanner, so
/// implementations must tolerate concurrent calls.
pub trait MetricSink: Send + Sync {
    /// Increment a counter. `value` is non-negative.
    fn add(&self, counter: Counter, value: f64, labels: &Labels);

    /// Set an instantaneous gauge.
    fn set(&self, gauge: Gauge, value: f64, labels: &Labels);

    /// Register the observer computing a running-state gauge.
    fn register_observer(&self, gauge: RunningGauge, observer: Arc<dyn GaugeObserver>);
}
