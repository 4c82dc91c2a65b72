//! Volume Verifier
//!
//! Cross-checks an encoded volume against its source: every record of a
//! sorted index is read from the source file and through the verifying read
//! path of the shards, and the two copies must match byte for byte.

use tracing::{debug, info, instrument, warn};

use crate::domain::ports::{read_padded, BlockStore, RecordIndex, RecordRef};
use crate::ec::reconstruction::ShardReader;
use crate::error::{Error, Result};
use crate::metrics::EcMetrics;

/// Totals of a successful verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Records checked
    pub records: u64,
    /// Record bytes checked
    pub bytes: u64,
}

impl VerifyReport {
    fn merge(&mut self, other: VerifyReport) {
        self.records += other.records;
        self.bytes += other.bytes;
    }
}

/// Compares records of a source with their encoded copy
pub struct Verifier<'a, S, D: ?Sized> {
    reader: &'a ShardReader<S>,
    source: &'a D,
    workers: usize,
    metrics: Option<EcMetrics>,
}

impl<'a, S, D> Verifier<'a, S, D>
where
    S: BlockStore,
    D: BlockStore + ?Sized,
{
    pub fn new(reader: &'a ShardReader<S>, source: &'a D) -> Self {
        Self {
            reader,
            source,
            workers: 1,
            metrics: None,
        }
    }

    /// Check records with `workers` threads over contiguous chunks
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: EcMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Verify every record of `index`, stopping at the first failure
    #[instrument(skip_all, fields(records = index.record_count(), workers = self.workers))]
    pub fn verify<I: RecordIndex + ?Sized>(&self, index: &I) -> Result<VerifyReport> {
        let report = if self.workers <= 1 {
            let mut report = VerifyReport::default();
            index.ascending_visit(&mut |record| {
                self.check_record(record)?;
                report.records += 1;
                report.bytes += u64::from(record.size);
                Ok(())
            })?;
            report
        } else {
            let mut records = Vec::with_capacity(index.record_count());
            index.ascending_visit(&mut |record| {
                records.push(*record);
                Ok(())
            })?;
            self.verify_parallel(&records)?
        };

        info!(
            records = report.records,
            bytes = report.bytes,
            "Verification passed"
        );
        Ok(report)
    }

    fn verify_parallel(&self, records: &[RecordRef]) -> Result<VerifyReport> {
        if records.is_empty() {
            return Ok(VerifyReport::default());
        }

        let per_worker = records.len().div_ceil(self.workers);
        debug!(per_worker, "Splitting records across workers");

        let outcome = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = records
                .chunks(per_worker)
                .map(|chunk| s.spawn(move |_| self.verify_chunk(chunk)))
                .collect();

            let mut report = VerifyReport::default();
            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(chunk_report)) => report.merge(chunk_report),
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(Error::Index(
                            "verifier worker panicked".to_string(),
                        ));
                    }
                }
            }
            first_error.map_or(Ok(report), Err)
        });

        outcome.map_err(|_| Error::Index("verifier worker panicked".to_string()))?
    }

    fn verify_chunk(&self, records: &[RecordRef]) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for record in records {
            self.check_record(record)?;
            report.records += 1;
            report.bytes += u64::from(record.size);
        }
        Ok(report)
    }

    fn check_record(&self, record: &RecordRef) -> Result<()> {
        let size = record.size as usize;

        let mut expected = vec![0u8; size];
        let read = read_padded(self.source, &mut expected, record.offset)?;
        if read < size {
            return Err(Error::OutOfRange {
                offset: record.offset,
                size: u64::from(record.size),
                source_size: self.source.size()?,
            });
        }

        let actual = self
            .reader
            .read_verified(record.offset, u64::from(record.size))?;
        if actual != expected {
            warn!(
                key = record.key,
                offset = record.offset,
                size = record.size,
                "Shard bytes differ from source"
            );
            return Err(Error::VerificationFailed {
                key: record.key,
                offset: record.offset,
                size: record.size,
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_verified();
        }
        Ok(())
    }
}
