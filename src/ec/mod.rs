//! Erasure Coding Module
//!
//! Splits an immutable source into N data shards and M parity shards and
//! serves byte ranges of the source back from them, rebuilding lost blocks
//! with Reed-Solomon when needed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Erasure Coding Module                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │   Geometry   │───▶│    Shard     │───▶│   Encoder / Decoder       │  │
//! │  │   (layout)   │    │   Encoder    │    │   (reed-solomon-erasure)  │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │         │                                             │                  │
//! │         ▼                                             ▼                  │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │   Locator    │───▶│ Shard Reader │───▶│   Repair / Verifier       │  │
//! │  │ (intervals)  │    │ (+ rebuild)  │    │                           │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Geometry** (`geometry.rs`): block sizes, row counts and shard sizes
//!   for a source of a given length.
//! - **Encoder/Decoder** (`encoder.rs`): Reed-Solomon over equal-length
//!   blocks using the `reed-solomon-erasure` crate.
//! - **Shard Encoder** (`shard_encoder.rs`): streams a source into N+M
//!   shard sinks, optionally with several worker threads.
//! - **Locator** (`locate.rs`): maps a logical range to per-block intervals.
//! - **Shard Reader** (`reconstruction.rs`): serves ranges from primary
//!   shards, reconstructing from survivors when a shard is unavailable.
//! - **Repair** (`repair.rs`): regenerates lost shards and decodes the
//!   source.
//! - **Verifier** (`verify.rs`): cross-checks indexed records against the
//!   source.
//! - **Metadata** (`metadata.rs`): the manifest stored next to the shards.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ecvol::adapters::MemoryBlockStore;
//! use ecvol::ec::{EcGeometry, ShardEncoder, ShardReader, ShardSet};
//!
//! let geometry = EcGeometry::new(10, 4, 10_000, 100)?;
//! let source = MemoryBlockStore::from_vec(data);
//! let shards: Vec<MemoryBlockStore> = (0..14).map(|_| MemoryBlockStore::new()).collect();
//! ShardEncoder::new(geometry, 4096)?.encode(&source, &shards)?;
//!
//! let mut set = ShardSet::new(shards);
//! set.mark_unavailable(3);
//! let reader = ShardReader::open(geometry, source.size()?, set)?;
//! let bytes = reader.read(0, 100, true)?;
//! ```

pub mod encoder;
pub mod geometry;
pub mod locate;
pub mod metadata;
pub mod reconstruction;
pub mod repair;
pub mod shard_encoder;
pub mod verify;

#[cfg(test)]
mod proptest;

pub use encoder::{EcDecoder, EcEncoder};
pub use geometry::{EcGeometry, Layout, Region, RowSpec};
pub use locate::{locate, Interval};
pub use metadata::EcManifest;
pub use reconstruction::{ReadMode, ShardReader, ShardSelection, ShardSet};
pub use repair::{decode_source, rebuild_missing_shards, RebuildSummary};
pub use shard_encoder::{EncodeSummary, ShardEncoder};
pub use verify::{Verifier, VerifyReport};
