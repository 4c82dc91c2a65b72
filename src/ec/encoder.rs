//! Erasure Coding Encoder/Decoder
//!
//! Thin wrappers around the systematic GF(2^8) Reed-Solomon code of the
//! `reed-solomon-erasure` crate. Both sides operate on one row's worth of
//! equally sized blocks: the encoder fills in parity blocks, the decoder
//! fills in absent blocks from any `N` survivors.

use crate::error::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::sync::Arc;
use tracing::{debug, instrument};

fn build_codec(data_shards: usize, parity_shards: usize) -> Result<Arc<ReedSolomon>> {
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

    let rs = ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
        Error::InvalidEcConfig(format!("Failed to create Reed-Solomon codec: {}", e))
    })?;

    Ok(Arc::new(rs))
}

// =============================================================================
// EC Encoder
// =============================================================================

/// Computes parity blocks for one row of data blocks
#[derive(Clone)]
pub struct EcEncoder {
    /// Reed-Solomon codec instance
    rs: Arc<ReedSolomon>,
    /// Number of data shards (N)
    data_shards: usize,
    /// Number of parity shards (M)
    parity_shards: usize,
}

impl EcEncoder {
    /// Create a new encoder with the specified N+M configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        Ok(Self {
            rs: build_codec(data_shards, parity_shards)?,
            data_shards,
            parity_shards,
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

    /// Compute parity in place.
    ///
    /// `blocks` holds N data blocks followed by M parity blocks. Parity blocks
    /// are resized to the data block length before encoding, so callers may
    /// pass empty buffers for them.
    #[instrument(level = "trace", skip(self, blocks))]
    pub fn encode_blocks(&self, blocks: &mut [Vec<u8>]) -> Result<()> {
        if blocks.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} blocks, got {}",
                self.total_shards(),
                blocks.len()
            )));
        }

        let block_len = blocks[0].len();
        if blocks[..self.data_shards]
            .iter()
            .any(|b| b.len() != block_len)
        {
            return Err(Error::EcEncodingFailed(
                "data blocks of one row must have equal length".to_string(),
            ));
        }
        for parity in blocks[self.data_shards..].iter_mut() {
            parity.resize(block_len, 0);
        }

        self.rs
            .encode(blocks)
            .map_err(|e| Error::EcEncodingFailed(format!("Reed-Solomon encoding failed: {}", e)))?;

        Ok(())
    }

    /// Verify that the parity blocks are consistent with the data blocks
    pub fn verify(&self, blocks: &[Vec<u8>]) -> Result<bool> {
        if blocks.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} blocks, got {}",
                self.total_shards(),
                blocks.len()
            )));
        }

        self.rs
            .verify(blocks)
            .map_err(|e| Error::EcEncodingFailed(format!("Verification failed: {}", e)))
    }
}

// =============================================================================
// EC Decoder
// =============================================================================

/// Rebuilds absent blocks of a row from any N survivors
#[derive(Clone)]
pub struct EcDecoder {
    /// Reed-Solomon codec instance
    rs: Arc<ReedSolomon>,
    /// Number of data shards (N)
    data_shards: usize,
    /// Number of parity shards (M)
    parity_shards: usize,
}

impl EcDecoder {
    /// Create a new decoder with the specified N+M configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        Ok(Self {
            rs: build_codec(data_shards, parity_shards)?,
            data_shards,
            parity_shards,
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

    fn check_present(&self, blocks: &[Option<Vec<u8>>]) -> Result<usize> {
        if blocks.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} blocks, got {}",
                self.total_shards(),
                blocks.len()
            )));
        }

        let available = blocks.iter().filter(|b| b.is_some()).count();
        if available < self.data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }
        Ok(available)
    }

    /// Reconstruct every absent block, data and parity alike
    #[instrument(level = "trace", skip(self, blocks))]
    pub fn reconstruct(&self, blocks: &mut [Option<Vec<u8>>]) -> Result<()> {
        let available = self.check_present(blocks)?;

        self.rs
            .reconstruct(blocks)
            .map_err(|e| Error::EcReconstructionFailed {
                shard: first_absent(blocks),
                reason: format!("Reed-Solomon reconstruction failed: {}", e),
            })?;

        debug!(
            "Reconstructed blocks from {}/{} available",
            available,
            self.total_shards()
        );
        Ok(())
    }

    /// Reconstruct only the absent data blocks
    #[instrument(level = "trace", skip(self, blocks))]
    pub fn reconstruct_data(&self, blocks: &mut [Option<Vec<u8>>]) -> Result<()> {
        let available = self.check_present(blocks)?;

        self.rs
            .reconstruct_data(blocks)
            .map_err(|e| Error::EcReconstructionFailed {
                shard: first_absent(blocks),
                reason: format!("Reed-Solomon data reconstruction failed: {}", e),
            })?;

        debug!(
            "Reconstructed data blocks from {}/{} available",
            available,
            self.total_shards()
        );
        Ok(())
    }

    /// Reconstruct and take the block at `target`
    pub fn recover(&self, blocks: &mut [Option<Vec<u8>>], target: usize) -> Result<Vec<u8>> {
        if target < self.data_shards {
            self.reconstruct_data(blocks)?;
        } else {
            self.reconstruct(blocks)?;
        }

        blocks
            .get_mut(target)
            .and_then(Option::take)
            .ok_or_else(|| Error::EcReconstructionFailed {
                shard: target,
                reason: "codec left the target slot empty".to_string(),
            })
    }
}

fn first_absent(blocks: &[Option<Vec<u8>>]) -> usize {
    blocks.iter().position(Option::is_none).unwrap_or(0)
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Calculate storage overhead ratio (total/data)
pub fn storage_overhead(data_shards: usize, parity_shards: usize) -> f64 {
    (data_shards + parity_shards) as f64 / data_shards as f64
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(k: usize, m: usize, block_len: usize) -> Vec<Vec<u8>> {
        let mut blocks: Vec<Vec<u8>> = (0..k)
            .map(|i| {
                (0..block_len)
                    .map(|j| (i * 31 + j * 7) as u8)
                    .collect()
            })
            .collect();
        blocks.extend((0..m).map(|_| Vec::new()));
        blocks
    }

    #[test]
    fn test_encoder_new() {
        let encoder = EcEncoder::new(10, 4).unwrap();
        assert_eq!(encoder.data_shards(), 10);
        assert_eq!(encoder.parity_shards(), 4);
        assert_eq!(encoder.total_shards(), 14);
    }

    #[test]
    fn test_encoder_invalid_config() {
        assert!(EcEncoder::new(0, 2).is_err());
        assert!(EcEncoder::new(4, 0).is_err());
        assert!(EcDecoder::new(0, 2).is_err());
    }

    #[test]
    fn test_encode_blocks_verify() {
        let encoder = EcEncoder::new(4, 2).unwrap();
        let mut blocks = row(4, 2, 64);

        encoder.encode_blocks(&mut blocks).unwrap();

        assert!(blocks.iter().all(|b| b.len() == 64));
        assert!(encoder.verify(&blocks).unwrap());
    }

    #[test]
    fn test_encode_rejects_ragged_row() {
        let encoder = EcEncoder::new(4, 2).unwrap();
        let mut blocks = row(4, 2, 64);
        blocks[2].truncate(10);

        assert!(matches!(
            encoder.encode_blocks(&mut blocks),
            Err(Error::EcEncodingFailed(_))
        ));
    }

    #[test]
    fn test_recover_data_and_parity() {
        let encoder = EcEncoder::new(4, 2).unwrap();
        let decoder = EcDecoder::new(4, 2).unwrap();
        let mut blocks = row(4, 2, 32);
        encoder.encode_blocks(&mut blocks).unwrap();

        for target in 0..6 {
            let mut optional: Vec<Option<Vec<u8>>> = blocks.iter().cloned().map(Some).collect();
            optional[target] = None;
            optional[(target + 1) % 6] = None;

            let recovered = decoder.recover(&mut optional, target).unwrap();
            assert_eq!(recovered, blocks[target], "target {}", target);
        }
    }

    #[test]
    fn test_reconstruct_insufficient_shards() {
        let decoder = EcDecoder::new(4, 2).unwrap();

        let mut blocks: Vec<Option<Vec<u8>>> = vec![
            Some(vec![0u8; 16]),
            Some(vec![0u8; 16]),
            Some(vec![0u8; 16]),
            None,
            None,
            None,
        ];

        let result = decoder.reconstruct(&mut blocks);
        assert!(matches!(
            result,
            Err(Error::InsufficientShards {
                available: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn test_storage_overhead() {
        assert!((storage_overhead(4, 2) - 1.5).abs() < 0.001);
        assert!((storage_overhead(10, 4) - 1.4).abs() < 0.001);
    }

    #[test]
    fn test_encoding_is_column_independent() {
        // Encoding a row in two column windows yields the same parity as
        // encoding it whole.
        let encoder = EcEncoder::new(3, 2).unwrap();
        let mut whole = row(3, 2, 40);
        encoder.encode_blocks(&mut whole).unwrap();

        let mut left: Vec<Vec<u8>> = whole.iter().take(3).map(|b| b[..25].to_vec()).collect();
        left.extend([Vec::new(), Vec::new()]);
        let mut right: Vec<Vec<u8>> = whole.iter().take(3).map(|b| b[25..].to_vec()).collect();
        right.extend([Vec::new(), Vec::new()]);
        encoder.encode_blocks(&mut left).unwrap();
        encoder.encode_blocks(&mut right).unwrap();

        for p in 3..5 {
            let mut joined = left[p].clone();
            joined.extend_from_slice(&right[p]);
            assert_eq!(joined, whole[p]);
        }
    }
}
