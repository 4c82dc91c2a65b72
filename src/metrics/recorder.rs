//! EC Metrics Recorder
//!
//! Counters live in a private Prometheus registry so several volumes (or
//! tests) can keep independent sets side by side.

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Counters for one encode/read/verify session
#[derive(Clone)]
pub struct EcMetrics {
    registry: Registry,
    rows_encoded: IntCounter,
    bytes_encoded: IntCounter,
    intervals_read: IntCounter,
    bytes_read: IntCounter,
    reconstructions: IntCounter,
    reconstruction_mismatches: IntCounter,
    records_verified: IntCounter,
    shards_rebuilt: IntCounter,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_encoded: u64,
    pub bytes_encoded: u64,
    pub intervals_read: u64,
    pub bytes_read: u64,
    pub reconstructions: u64,
    pub reconstruction_mismatches: u64,
    pub records_verified: u64,
    pub shards_rebuilt: u64,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace("ecvol"))
        .map_err(|e| Error::Config(format!("invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Config(format!("failed to register metric {}: {}", name, e)))?;
    Ok(counter)
}

impl EcMetrics {
    /// Create a fresh set of counters
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            rows_encoded: counter(&registry, "rows_encoded_total", "Rows encoded into shards")?,
            bytes_encoded: counter(&registry, "bytes_encoded_total", "Source bytes encoded")?,
            intervals_read: counter(&registry, "intervals_read_total", "Intervals read")?,
            bytes_read: counter(&registry, "bytes_read_total", "Logical bytes returned by reads")?,
            reconstructions: counter(
                &registry,
                "reconstructions_total",
                "Intervals recovered through Reed-Solomon reconstruction",
            )?,
            reconstruction_mismatches: counter(
                &registry,
                "reconstruction_mismatches_total",
                "Reconstructed intervals that differed from the primary copy",
            )?,
            records_verified: counter(&registry, "records_verified_total", "Records verified")?,
            shards_rebuilt: counter(&registry, "shards_rebuilt_total", "Shard files rebuilt")?,
            registry,
        })
    }

    pub fn record_row_encoded(&self, source_bytes: u64) {
        self.rows_encoded.inc();
        self.bytes_encoded.inc_by(source_bytes);
    }

    pub fn record_interval_read(&self, bytes: u64) {
        self.intervals_read.inc();
        self.bytes_read.inc_by(bytes);
    }

    pub fn record_reconstruction(&self) {
        self.reconstructions.inc();
    }

    pub fn record_mismatch(&self) {
        self.reconstruction_mismatches.inc();
    }

    pub fn record_verified(&self) {
        self.records_verified.inc();
    }

    pub fn record_shard_rebuilt(&self) {
        self.shards_rebuilt.inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_encoded: self.rows_encoded.get(),
            bytes_encoded: self.bytes_encoded.get(),
            intervals_read: self.intervals_read.get(),
            bytes_read: self.bytes_read.get(),
            reconstructions: self.reconstructions.get(),
            reconstruction_mismatches: self.reconstruction_mismatches.get(),
            records_verified: self.records_verified.get(),
            shards_rebuilt: self.shards_rebuilt.get(),
        }
    }

    /// Render every counter in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Config(format!("failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Config(format!("metrics output is not UTF-8: {}", e)))
    }
}

impl std::fmt::Debug for EcMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = EcMetrics::new().unwrap();
        metrics.record_row_encoded(1000);
        metrics.record_row_encoded(24);
        metrics.record_interval_read(10);
        metrics.record_reconstruction();

        let snap = metrics.snapshot();
        assert_eq!(snap.rows_encoded, 2);
        assert_eq!(snap.bytes_encoded, 1024);
        assert_eq!(snap.intervals_read, 1);
        assert_eq!(snap.reconstructions, 1);
        assert_eq!(snap.records_verified, 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = EcMetrics::new().unwrap();
        let b = EcMetrics::new().unwrap();
        a.record_verified();
        assert_eq!(b.snapshot().records_verified, 0);
    }

    #[test]
    fn test_render() {
        let metrics = EcMetrics::new().unwrap();
        metrics.record_shard_rebuilt();
        let text = metrics.render().unwrap();
        assert!(text.contains("ecvol_shards_rebuilt_total 1"));
    }
}
