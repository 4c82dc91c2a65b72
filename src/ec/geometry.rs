//! Block Geometry
//!
//! Pure arithmetic describing how a source file decomposes into rows of
//! blocks. A source is laid out as a large-block region (block size `L`)
//! holding every full `N * L` row, followed by a small-block tail region
//! (block size `S`) holding the remainder, zero-padded to a whole `N * S` row.
//!
//! ```text
//!   source:  | row 0 (N x L) | row 1 (N x L) | tail row 0 (N x S) | tail row 1 ...
//!   shard i: | L             | L             | S                  | S ...
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on `N + M` for a GF(2^8) Reed-Solomon code
pub const MAX_TOTAL_SHARDS: usize = 256;

// =============================================================================
// Geometry
// =============================================================================

/// Coding and block-size parameters of one encoded source.
///
/// Encode and read must use the same geometry; results are undefined
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcGeometry {
    /// Number of data shards (N)
    data_shards: usize,
    /// Number of parity shards (M)
    parity_shards: usize,
    /// Block size of the large-block region (L)
    large_block_size: u64,
    /// Block size of the small-block tail region (S)
    small_block_size: u64,
}

impl EcGeometry {
    /// Create a validated geometry
    pub fn new(
        data_shards: usize,
        parity_shards: usize,
        large_block_size: u64,
        small_block_size: u64,
    ) -> Result<Self> {
        if data_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "data_shards must be greater than 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(Error::InvalidEcConfig(
                "parity_shards must be greater than 0".to_string(),
            ));
        }
        if data_shards + parity_shards > MAX_TOTAL_SHARDS {
            return Err(Error::InvalidEcConfig(format!(
                "data_shards + parity_shards must not exceed {}, got {}",
                MAX_TOTAL_SHARDS,
                data_shards + parity_shards
            )));
        }
        if small_block_size == 0 {
            return Err(Error::InvalidEcConfig(
                "small_block_size must be greater than 0".to_string(),
            ));
        }
        if large_block_size <= small_block_size {
            return Err(Error::InvalidEcConfig(format!(
                "large_block_size ({}) must be greater than small_block_size ({})",
                large_block_size, small_block_size
            )));
        }
        if large_block_size.checked_mul(data_shards as u64).is_none() {
            return Err(Error::InvalidEcConfig(format!(
                "large_block_size ({}) times data_shards ({}) overflows u64",
                large_block_size, data_shards
            )));
        }

        Ok(Self {
            data_shards,
            parity_shards,
            large_block_size,
            small_block_size,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    pub fn large_block_size(&self) -> u64 {
        self.large_block_size
    }

    pub fn small_block_size(&self) -> u64 {
        self.small_block_size
    }

    /// Block size of the given region
    pub fn block_size(&self, region: Region) -> u64 {
        match region {
            Region::Large => self.large_block_size,
            Region::Small => self.small_block_size,
        }
    }

    /// Source bytes covered by one row of the given region
    pub fn row_bytes(&self, region: Region) -> u64 {
        self.block_size(region) * self.data_shards as u64
    }

    /// Split a source size into its large-row count and tail size
    pub fn layout(&self, source_size: u64) -> Layout {
        let large_rows = source_size / self.row_bytes(Region::Large);
        let tail_size = source_size - large_rows * self.row_bytes(Region::Large);
        let small_rows = tail_size.div_ceil(self.row_bytes(Region::Small));

        Layout {
            large_rows,
            tail_size,
            small_rows,
        }
    }

    /// Length every shard has after encoding a source of `source_size` bytes
    pub fn shard_size(&self, source_size: u64) -> u64 {
        let layout = self.layout(source_size);
        layout.large_rows * self.large_block_size + layout.small_rows * self.small_block_size
    }

    /// Byte offset inside a shard where row `row` of `region` starts
    pub fn row_shard_offset(&self, layout: &Layout, region: Region, row: u64) -> u64 {
        match region {
            Region::Large => row * self.large_block_size,
            Region::Small => {
                layout.large_rows * self.large_block_size + row * self.small_block_size
            }
        }
    }

    /// Every row of the encoded source in shard order
    pub fn rows(&self, source_size: u64) -> Vec<RowSpec> {
        let layout = self.layout(source_size);
        let large = (0..layout.large_rows).map(|row| RowSpec {
            region: Region::Large,
            row,
            source_offset: row * self.row_bytes(Region::Large),
            block_size: self.large_block_size,
            shard_offset: self.row_shard_offset(&layout, Region::Large, row),
        });
        let small = (0..layout.small_rows).map(|row| RowSpec {
            region: Region::Small,
            row,
            source_offset: layout.large_region_bytes(self) + row * self.row_bytes(Region::Small),
            block_size: self.small_block_size,
            shard_offset: self.row_shard_offset(&layout, Region::Small, row),
        });

        large.chain(small).collect()
    }
}

// =============================================================================
// Layout
// =============================================================================

/// Region of a shard a block belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Blocks of size L
    Large,
    /// Tail blocks of size S
    Small,
}

/// Decomposition of one source size under a geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Number of full `N * L` rows
    pub large_rows: u64,
    /// Source bytes left after the large rows
    pub tail_size: u64,
    /// Number of `N * S` rows needed for the tail (last one padded)
    pub small_rows: u64,
}

impl Layout {
    /// Logical bytes covered by the large-block region
    pub fn large_region_bytes(&self, geometry: &EcGeometry) -> u64 {
        self.large_rows * geometry.row_bytes(Region::Large)
    }
}

/// One encoding row: where it comes from in the source and where its blocks
/// land in every shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpec {
    pub region: Region,
    /// Row number within its region
    pub row: u64,
    /// Source offset of the row's first byte
    pub source_offset: u64,
    pub block_size: u64,
    /// Offset of this row's block inside each shard
    pub shard_offset: u64,
}

/// `(large_rows, tail_size)` for a source under the given geometry
pub fn geometry(geometry: &EcGeometry, source_size: u64) -> (u64, u64) {
    let layout = geometry.layout(source_size);
    (layout.large_rows, layout.tail_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> EcGeometry {
        EcGeometry::new(10, 4, 10_000, 100).unwrap()
    }

    #[test]
    fn test_invalid_config() {
        assert!(EcGeometry::new(0, 4, 10, 1).is_err());
        assert!(EcGeometry::new(10, 0, 10, 1).is_err());
        assert!(EcGeometry::new(10, 4, 10, 10).is_err());
        assert!(EcGeometry::new(10, 4, 10, 0).is_err());
        assert!(EcGeometry::new(200, 57, 10, 1).is_err());
        assert!(EcGeometry::new(200, 56, 10, 1).is_ok());
    }

    #[test]
    fn test_large_row_overflow_rejected() {
        let result = EcGeometry::new(10, 4, u64::MAX / 2, 100);
        assert!(matches!(result, Err(Error::InvalidEcConfig(_))));

        let g = EcGeometry::new(10, 4, u64::MAX / 10, 100).unwrap();
        assert_eq!(g.shard_size(1_000), 100);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(geometry(&geo(), 0), (0, 0));
        assert_eq!(geo().shard_size(0), 0);
        assert!(geo().rows(0).is_empty());
    }

    #[test]
    fn test_one_byte_tail() {
        let g = geo();
        assert_eq!(geometry(&g, 100_001), (1, 1));

        let layout = g.layout(100_001);
        assert_eq!(layout.small_rows, 1);
        assert_eq!(g.shard_size(100_001), 10_000 + 100);
    }

    #[test]
    fn test_exact_large_rows() {
        let g = geo();
        let layout = g.layout(200_000);
        assert_eq!(layout.large_rows, 2);
        assert_eq!(layout.tail_size, 0);
        assert_eq!(layout.small_rows, 0);
        assert_eq!(g.shard_size(200_000), 20_000);
    }

    #[test]
    fn test_tail_rows() {
        let g = geo();
        // 1 large row + 2500 tail bytes -> 3 small rows of 1000 source bytes
        let layout = g.layout(102_500);
        assert_eq!(layout.small_rows, 3);
        assert_eq!(g.shard_size(102_500), 10_000 + 300);
    }

    #[test]
    fn test_rows_are_ordered() {
        let g = geo();
        let rows = g.rows(102_500);
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0].region, Region::Large);
        assert_eq!(rows[0].shard_offset, 0);

        assert_eq!(rows[1].region, Region::Small);
        assert_eq!(rows[1].row, 0);
        assert_eq!(rows[1].source_offset, 100_000);
        assert_eq!(rows[1].shard_offset, 10_000);

        assert_eq!(rows[3].source_offset, 102_000);
        assert_eq!(rows[3].shard_offset, 10_200);
    }
}
