//! Shard Encoder
//!
//! Turns an immutable source into N data shards and M parity shards. The
//! source is consumed row by row: every full `N * L` row of the large-block
//! region first, then `N * S` rows over the tail, the last one zero-padded.
//! Each row's N data blocks plus M computed parity blocks land in shards
//! `0..N+M` at the row's shard offset.
//!
//! Rows are encoded in column windows of at most `buffer_size` bytes per
//! block, so memory stays at `(N + M) * buffer_size` however large `L` is.
//! With more than one worker, rows are split into contiguous ranges and
//! written positionally, which keeps row order in every shard intact.

use tracing::{debug, info, instrument};

use crate::domain::ports::{read_padded, BlockSink, BlockStore};
use crate::ec::encoder::EcEncoder;
use crate::ec::geometry::{EcGeometry, RowSpec};
use crate::error::{Error, Result};
use crate::metrics::EcMetrics;

/// Outcome of a successful encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Bytes consumed from the source
    pub source_size: u64,
    /// Rows written to every shard
    pub rows: usize,
    /// Final length of every shard
    pub shard_size: u64,
}

/// Encodes a source into a shard set
pub struct ShardEncoder {
    geometry: EcGeometry,
    encoder: EcEncoder,
    buffer_size: usize,
    workers: usize,
    metrics: Option<EcMetrics>,
}

impl ShardEncoder {
    /// Create an encoder processing at most `buffer_size` bytes of each
    /// block per codec call
    pub fn new(geometry: EcGeometry, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".to_string()));
        }

        Ok(Self {
            encoder: EcEncoder::new(geometry.data_shards(), geometry.parity_shards())?,
            geometry,
            buffer_size,
            workers: 1,
            metrics: None,
        })
    }

    /// Encode with `workers` threads, each owning a contiguous row range
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: EcMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn geometry(&self) -> &EcGeometry {
        &self.geometry
    }

    /// Encode the whole of `source` into `shards`.
    ///
    /// `shards` must hold exactly `N + M` sinks, in shard order. On failure
    /// the shards are left partially written; discarding them is up to the
    /// caller.
    #[instrument(skip(self, source, shards), fields(workers = self.workers))]
    pub fn encode<R, W>(&self, source: &R, shards: &[W]) -> Result<EncodeSummary>
    where
        R: BlockStore + ?Sized,
        W: BlockSink,
    {
        let total = self.geometry.total_shards();
        if shards.len() != total {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shard sinks, got {}",
                total,
                shards.len()
            )));
        }

        let source_size = source.size()?;
        let rows = self.geometry.rows(source_size);

        info!(
            source_size,
            rows = rows.len(),
            data_shards = self.geometry.data_shards(),
            parity_shards = self.geometry.parity_shards(),
            "Encoding source into shards"
        );

        if self.workers <= 1 || rows.len() <= 1 {
            self.encode_rows(source, shards, &rows, source_size)?;
        } else {
            self.encode_parallel(source, shards, &rows, source_size)?;
        }

        for (i, shard) in shards.iter().enumerate() {
            shard
                .sync()
                .map_err(|source| Error::EncodeWriteFailure { shard: i, source })?;
        }

        let summary = EncodeSummary {
            source_size,
            rows: rows.len(),
            shard_size: self.geometry.shard_size(source_size),
        };
        info!(
            rows = summary.rows,
            shard_size = summary.shard_size,
            "Encoding complete"
        );
        Ok(summary)
    }

    fn encode_parallel<R, W>(
        &self,
        source: &R,
        shards: &[W],
        rows: &[RowSpec],
        source_size: u64,
    ) -> Result<()>
    where
        R: BlockStore + ?Sized,
        W: BlockSink,
    {
        let per_worker = rows.len().div_ceil(self.workers);
        debug!(per_worker, "Splitting rows across workers");

        let outcome = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = rows
                .chunks(per_worker)
                .map(|chunk| s.spawn(move |_| self.encode_rows(source, shards, chunk, source_size)))
                .collect();

            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(Error::EcEncodingFailed(
                            "encoder worker panicked".to_string(),
                        ));
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        outcome.map_err(|_| Error::EcEncodingFailed("encoder worker panicked".to_string()))?
    }

    fn encode_rows<R, W>(
        &self,
        source: &R,
        shards: &[W],
        rows: &[RowSpec],
        source_size: u64,
    ) -> Result<()>
    where
        R: BlockStore + ?Sized,
        W: BlockSink,
    {
        let data_shards = self.geometry.data_shards();
        let mut blocks: Vec<Vec<u8>> = vec![Vec::new(); self.geometry.total_shards()];

        for row in rows {
            let mut window_start = 0u64;
            while window_start < row.block_size {
                let window = (row.block_size - window_start).min(self.buffer_size as u64) as usize;

                for (i, block) in blocks.iter_mut().take(data_shards).enumerate() {
                    block.clear();
                    block.resize(window, 0);

                    let offset = row.source_offset + i as u64 * row.block_size + window_start;
                    if offset < source_size {
                        read_padded(source, block, offset)?;
                    }
                }

                self.encoder.encode_blocks(&mut blocks)?;

                for (i, block) in blocks.iter().enumerate() {
                    shards[i]
                        .write_at(block, row.shard_offset + window_start)
                        .map_err(|source| Error::EncodeWriteFailure { shard: i, source })?;
                }

                window_start += window as u64;
            }

            if let Some(metrics) = &self.metrics {
                let row_bytes = row.block_size * data_shards as u64;
                metrics.record_row_encoded(row_bytes.min(source_size - row.source_offset));
            }
        }

        Ok(())
    }
}
