//! Metrics
//!
//! Prometheus counters for encode, read, verify and rebuild runs.

mod recorder;

pub use recorder::{EcMetrics, MetricsSnapshot};
