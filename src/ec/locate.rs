//! Interval Locator
//!
//! Maps a logical byte range of the source onto per-block sub-reads. Each
//! [`Interval`] stays inside one block of one shard; a request crossing block
//! boundaries (including the large/small region boundary) yields one interval
//! per block touched, in ascending order.

use crate::ec::geometry::{EcGeometry, Region};

/// A sub-read confined to a single block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// Row-major block number within the interval's region
    pub block_index: u64,
    /// Byte offset within the block
    pub inner_block_offset: u64,
    pub size: u64,
    pub is_large_block: bool,
}

impl Interval {
    pub fn region(&self) -> Region {
        if self.is_large_block {
            Region::Large
        } else {
            Region::Small
        }
    }

    /// Row of the region the block belongs to
    pub fn row_index(&self, geometry: &EcGeometry) -> u64 {
        self.block_index / geometry.data_shards() as u64
    }

    /// Data shard holding the block
    pub fn shard_index(&self, geometry: &EcGeometry) -> usize {
        (self.block_index % geometry.data_shards() as u64) as usize
    }

    /// Byte offset of the interval's first byte inside every shard
    pub fn shard_offset(&self, geometry: &EcGeometry, large_rows: u64) -> u64 {
        let row = self.row_index(geometry);
        let row_start = match self.region() {
            Region::Large => row * geometry.large_block_size(),
            Region::Small => {
                large_rows * geometry.large_block_size() + row * geometry.small_block_size()
            }
        };
        row_start + self.inner_block_offset
    }

    /// `(shard index, shard offset)` of the interval
    pub fn to_shard_and_offset(&self, geometry: &EcGeometry, large_rows: u64) -> (usize, u64) {
        (
            self.shard_index(geometry),
            self.shard_offset(geometry, large_rows),
        )
    }
}

/// Split `[offset, offset + size)` of a source of `source_size` bytes into
/// block-local intervals.
///
/// The caller guarantees `offset + size <= source_size`; an empty request
/// yields no intervals.
pub fn locate(geometry: &EcGeometry, source_size: u64, offset: u64, size: u64) -> Vec<Interval> {
    let layout = geometry.layout(source_size);
    let boundary = layout.large_region_bytes(geometry);

    let end = offset + size;
    let mut intervals = Vec::new();
    let mut pos = offset;

    while pos < end {
        let (region, region_pos) = if pos < boundary {
            (Region::Large, pos)
        } else {
            (Region::Small, pos - boundary)
        };
        let block_size = geometry.block_size(region);

        let inner_block_offset = region_pos % block_size;
        let len = (block_size - inner_block_offset).min(end - pos);

        intervals.push(Interval {
            block_index: region_pos / block_size,
            inner_block_offset,
            size: len,
            is_large_block: region == Region::Large,
        });
        pos += len;
    }

    intervals
}
