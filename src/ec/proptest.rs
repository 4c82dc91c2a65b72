//! Property-Based Tests for Erasure Coding
//!
//! Uses proptest to check the locator, the shard encoder and the shard
//! reader across a wide range of geometries, source sizes and losses.
//!
//! # Test Properties
//!
//! 1. **Coverage**: intervals tile the requested range exactly, in order
//! 2. **Bounds**: no interval crosses a block or runs past the shard end
//! 3. **Roundtrip**: encode(source) then read(range) = source[range]
//! 4. **Fault Tolerance**: any N surviving shards rebuild a lost block

#![cfg(test)]

use proptest::prelude::*;

use super::geometry::EcGeometry;
use super::locate::locate;
use super::reconstruction::{ShardReader, ShardSelection, ShardSet};
use super::shard_encoder::ShardEncoder;
use crate::adapters::MemoryBlockStore;

// =============================================================================
// Property Strategies
// =============================================================================

/// Small geometries: N 1-6, M 1-3, S 1-16, L a multiple-ish above S
fn geometry_strategy() -> impl Strategy<Value = EcGeometry> {
    (1usize..=6, 1usize..=3, 1u64..=16, 1u64..=8).prop_map(|(n, m, s, factor)| {
        EcGeometry::new(n, m, s * factor + 1, s).expect("valid geometry")
    })
}

/// A source size and a range inside it
fn range_strategy(max_size: u64) -> impl Strategy<Value = (u64, u64, u64)> {
    (1..max_size).prop_flat_map(|source_size| {
        (0..source_size).prop_flat_map(move |offset| {
            (Just(source_size), Just(offset), 0..=source_size - offset)
        })
    })
}

fn encode(geometry: EcGeometry, data: &[u8], buffer_size: usize) -> Vec<MemoryBlockStore> {
    let shards: Vec<MemoryBlockStore> = (0..geometry.total_shards())
        .map(|_| MemoryBlockStore::new())
        .collect();
    ShardEncoder::new(geometry, buffer_size)
        .expect("encoder")
        .encode(&MemoryBlockStore::from_vec(data.to_vec()), &shards)
        .expect("encode");
    shards
}

// =============================================================================
// Locator Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: intervals are non-empty, contiguous and sum to the request.
    #[test]
    fn prop_intervals_cover_range(
        geometry in geometry_strategy(),
        (source_size, offset, size) in range_strategy(2_000),
    ) {
        let intervals = locate(&geometry, source_size, offset, size);
        let layout = geometry.layout(source_size);
        let boundary = layout.large_region_bytes(&geometry);

        let mut pos = offset;
        for interval in &intervals {
            prop_assert!(interval.size > 0);

            let block_size = geometry.block_size(interval.region());
            let region_start = if interval.is_large_block { 0 } else { boundary };
            let start =
                region_start + interval.block_index * block_size + interval.inner_block_offset;
            prop_assert_eq!(start, pos);
            pos += interval.size;
        }
        prop_assert_eq!(pos, offset + size);
    }

    /// Property: no interval crosses its block or the end of its shard.
    #[test]
    fn prop_intervals_within_bounds(
        geometry in geometry_strategy(),
        (source_size, offset, size) in range_strategy(2_000),
    ) {
        let layout = geometry.layout(source_size);
        let shard_size = geometry.shard_size(source_size);

        for interval in locate(&geometry, source_size, offset, size) {
            let block_size = geometry.block_size(interval.region());
            prop_assert!(interval.inner_block_offset + interval.size <= block_size);

            let (shard, shard_offset) = interval.to_shard_and_offset(&geometry, layout.large_rows);
            prop_assert!(shard < geometry.data_shards());
            prop_assert!(shard_offset + interval.size <= shard_size);
        }
    }
}

// =============================================================================
// Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: a primary read returns exactly the source bytes.
    #[test]
    fn prop_encode_read_roundtrip(
        geometry in geometry_strategy(),
        data in prop::collection::vec(any::<u8>(), 1..1_500),
        buffer_size in 1usize..64,
        range in (0.0f64..1.0, 0.0f64..1.0),
    ) {
        let len = data.len() as u64;
        let offset = ((len as f64) * range.0) as u64;
        let size = (((len - offset) as f64) * range.1) as u64;

        let shards = encode(geometry, &data, buffer_size);
        let reader = ShardReader::open(geometry, len, ShardSet::new(shards))?;

        let bytes = reader.read(offset, size, false)?;
        prop_assert_eq!(bytes.as_slice(), &data[offset as usize..(offset + size) as usize]);
    }

    /// Property: losing any single data shard changes nothing a reader sees.
    #[test]
    fn prop_single_loss_is_transparent(
        geometry in geometry_strategy(),
        data in prop::collection::vec(any::<u8>(), 1..1_500),
        lost in 0usize..6,
    ) {
        let lost = lost % geometry.data_shards();
        let len = data.len() as u64;

        let mut set = ShardSet::new(encode(geometry, &data, 32));
        set.mark_unavailable(lost);
        let reader = ShardReader::open(geometry, len, set)?;

        prop_assert_eq!(reader.read(0, len, true)?, data);
    }
}

// =============================================================================
// Fault Tolerance Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: shard 3 of a 10+4 set comes back from any 10 of the other 13.
    #[test]
    fn prop_any_survivor_subset_rebuilds(
        survivors in prop::sample::subsequence(
            (0usize..14).filter(|&i| i != 3).collect::<Vec<_>>(),
            10,
        ),
        data in prop::collection::vec(any::<u8>(), 500..3_000),
    ) {
        let geometry = EcGeometry::new(10, 4, 100, 10)?;
        let len = data.len() as u64;

        let mut set = ShardSet::new(encode(geometry, &data, 16));
        for shard in (0..14).filter(|i| !survivors.contains(i)) {
            set.mark_unavailable(shard);
        }
        let reader = ShardReader::open(geometry, len, set)?;

        prop_assert_eq!(reader.read(0, len, true)?, data);
    }

    /// Property: the seeded selection returns the same bytes as the default.
    #[test]
    fn prop_selection_does_not_change_bytes(
        seed in any::<u64>(),
        lost in prop::sample::subsequence((0usize..6).collect::<Vec<_>>(), 0..=2),
        data in prop::collection::vec(any::<u8>(), 1..800),
    ) {
        let geometry = EcGeometry::new(4, 2, 50, 5)?;
        let len = data.len() as u64;

        let mut set = ShardSet::new(encode(geometry, &data, 16));
        for &shard in &lost {
            set.mark_unavailable(shard);
        }
        let reader = ShardReader::open(geometry, len, set)?
            .with_selection(ShardSelection::Seeded(seed));

        prop_assert_eq!(reader.read(0, len, true)?, data);
    }
}
