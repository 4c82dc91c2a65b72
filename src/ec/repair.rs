//! Shard Repair
//!
//! Regenerates lost shards and reassembles the original source from a
//! [`ShardReader`]. Both walk the source row by row in windows of at most
//! `buffer_size` bytes per block.

use tracing::{debug, info, instrument};

use crate::domain::ports::{BlockSink, BlockStore};
use crate::ec::reconstruction::ShardReader;
use crate::error::{Error, Result};
use crate::metrics::EcMetrics;

/// Outcome of a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Shards that were rewritten
    pub shards: Vec<usize>,
    /// Rows processed
    pub rows: usize,
    /// Bytes written to each rebuilt shard
    pub shard_size: u64,
}

/// Rebuild shards of `reader` into `targets`, given as `(shard, sink)` pairs.
///
/// Every row needs N available shards other than the targets; otherwise the
/// rebuild stops with `InsufficientShards`. Targets may name data or parity
/// shards.
#[instrument(skip_all, fields(targets = targets.len()))]
pub fn rebuild_missing_shards<S, W>(
    reader: &ShardReader<S>,
    targets: &[(usize, W)],
    buffer_size: usize,
    metrics: Option<&EcMetrics>,
) -> Result<RebuildSummary>
where
    S: BlockStore,
    W: BlockSink,
{
    if buffer_size == 0 {
        return Err(Error::Config("buffer_size must be greater than 0".to_string()));
    }

    let geometry = reader.geometry();
    let total = geometry.total_shards();
    if let Some((shard, _)) = targets.iter().find(|(shard, _)| *shard >= total) {
        return Err(Error::InvalidEcConfig(format!(
            "Shard {} is outside a set of {}",
            shard, total
        )));
    }

    let shards: Vec<usize> = targets.iter().map(|(shard, _)| *shard).collect();
    let rows = geometry.rows(reader.source_size());
    info!(?shards, rows = rows.len(), "Rebuilding shards");

    for row in &rows {
        let mut window_start = 0u64;
        while window_start < row.block_size {
            let window = (row.block_size - window_start).min(buffer_size as u64) as usize;
            let offset = row.shard_offset + window_start;

            let blocks = reader.recover_all(offset, window)?;
            for (shard, sink) in targets {
                sink.write_at(&blocks[*shard], offset)
                    .map_err(|source| Error::EncodeWriteFailure {
                        shard: *shard,
                        source,
                    })?;
            }

            window_start += window as u64;
        }
    }

    for (shard, sink) in targets {
        sink.sync().map_err(|source| Error::EncodeWriteFailure {
            shard: *shard,
            source,
        })?;
        if let Some(metrics) = metrics {
            metrics.record_shard_rebuilt();
        }
    }

    let summary = RebuildSummary {
        shards,
        rows: rows.len(),
        shard_size: geometry.shard_size(reader.source_size()),
    };
    info!(rows = summary.rows, "Rebuild complete");
    Ok(summary)
}

/// Write the first `source_size` bytes of the encoded source into `sink`.
///
/// Unavailable data shards are reconstructed on the fly. Returns the number
/// of bytes written.
#[instrument(skip_all)]
pub fn decode_source<S, W>(reader: &ShardReader<S>, sink: &W, buffer_size: usize) -> Result<u64>
where
    S: BlockStore,
    W: BlockSink + ?Sized,
{
    if buffer_size == 0 {
        return Err(Error::Config("buffer_size must be greater than 0".to_string()));
    }

    let source_size = reader.source_size();
    let mut offset = 0u64;
    while offset < source_size {
        let chunk = (source_size - offset).min(buffer_size as u64);
        let data = reader.read(offset, chunk, true)?;
        sink.write_at(&data, offset)?;
        offset += chunk;
    }
    sink.sync()?;

    debug!(source_size, "Decoded source");
    Ok(source_size)
}
