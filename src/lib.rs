//! ecvol - Erasure-Coded Volume Files
//!
//! Protects large append-only record files against disk loss by splitting
//! them into N data shards plus M Reed-Solomon parity shards, and serves
//! arbitrary byte ranges of the original file back from the shards, even
//! with up to M of them gone.
//!
//! # Architecture
//!
//! ```text
//! source ──► ShardEncoder ──► <base>.ec01 .. <base>.ecNN ──► ShardReader ──► bytes
//!                                                               │
//!                                               Repair ◄────────┴────► Verifier
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - File and in-memory block stores
//! - [`config`] - Coding parameters and tuning knobs
//! - [`domain`] - Port traits the core is written against
//! - [`ec`] - Geometry, encoding, locating, reading and repair
//! - [`error`] - Error types
//! - [`index`] - Sorted record index files
//! - [`metrics`] - Prometheus counters
//! - [`volume`] - File-level operations on one volume

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ec;
pub mod error;
pub mod index;
pub mod metrics;
pub mod volume;

// Re-export commonly used types
pub use config::EcConfig;
pub use ec::{EcGeometry, EcManifest, ReadMode, ShardReader, ShardSelection, ShardSet};
pub use error::{Error, Result};
pub use index::SortedIndex;
pub use metrics::EcMetrics;
pub use volume::Volume;
