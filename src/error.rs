//! Error types for erasure-coded volumes

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, reading or repairing a volume
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Geometry / Layout Errors
    // =========================================================================
    /// Invalid EC configuration
    #[error("Invalid EC configuration: {0}")]
    InvalidEcConfig(String),

    /// Shard length disagrees with the geometry the caller supplied
    #[error(
        "Geometry mismatch on shard {shard}: expected {expected} bytes, found {actual}"
    )]
    GeometryMismatch {
        shard: usize,
        expected: u64,
        actual: u64,
    },

    /// Requested range lies outside the source
    #[error("Range {offset}+{size} is outside a source of {source_size} bytes")]
    OutOfRange {
        offset: u64,
        size: u64,
        source_size: u64,
    },

    // =========================================================================
    // Read Path Errors
    // =========================================================================
    /// A shard returned fewer bytes than requested
    #[error("Short read on shard {shard} at offset {offset}: wanted {expected}, got {actual}")]
    ShortRead {
        shard: usize,
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// Primary shard is unavailable and reconstruction was not allowed
    #[error("Shard {shard} is unavailable")]
    ShardUnavailable { shard: usize },

    /// Insufficient shards for reconstruction
    #[error("Insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    /// Reconstructed bytes differ from the primary copy
    #[error("Reconstruction mismatch on shard {shard} at offset {offset} ({size} bytes)")]
    ReconstructionMismatch {
        shard: usize,
        offset: u64,
        size: usize,
    },

    /// Bytes served from the shards differ from the source
    #[error("Record {key} at {offset}+{size} differs between source and shards")]
    VerificationFailed { key: u64, offset: u64, size: u32 },

    // =========================================================================
    // Codec Errors
    // =========================================================================
    /// EC encoding failed
    #[error("EC encoding failed: {0}")]
    EcEncodingFailed(String),

    /// EC reconstruction failed
    #[error("EC reconstruction failed for shard {shard}: {reason}")]
    EcReconstructionFailed { shard: usize, reason: String },

    /// Writing a shard failed during encoding or rebuild
    #[error("Failed to write shard {shard}: {source}")]
    EncodeWriteFailure {
        shard: usize,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Index Errors
    // =========================================================================
    /// Malformed record index
    #[error("Record index error: {0}")]
    Index(String),
}
