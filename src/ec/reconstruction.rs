//! Shard Reader / Reconstructor
//!
//! Serves logical byte ranges from a shard set. Every interval is read from
//! the data shard holding it; when that shard is unavailable (or in
//! verification mode) the same byte range is read from N other shards and
//! the missing block is rebuilt with Reed-Solomon.
//!
//! ```text
//!   read(offset, size)
//!        │
//!        ▼
//!   locate ──► Interval ──► primary shard available? ──yes──► read_at
//!                                   │ no
//!                                   ▼
//!                     select N survivors ──► read same range ──► decode
//! ```
//!
//! Reads never mutate shards, so one reader can be shared by any number of
//! threads.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::ports::BlockStore;
use crate::ec::encoder::EcDecoder;
use crate::ec::geometry::{EcGeometry, Layout};
use crate::ec::locate::{locate, Interval};
use crate::error::{Error, Result};
use crate::metrics::EcMetrics;

// =============================================================================
// Shard Selection
// =============================================================================

/// Policy for choosing which N survivors feed a reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardSelection {
    /// The N lowest-indexed available shards
    #[default]
    LowestIndexed,
    /// A random subset drawn from a generator seeded with the given value
    Seeded(u64),
}

/// How a single interval is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Primary shard only; an unavailable shard is an error
    Primary,
    /// Primary shard, reconstructing when it is unavailable
    AllowReconstruct,
    /// Primary and reconstructed copies, which must agree
    Verify,
}

// =============================================================================
// Shard Set
// =============================================================================

/// The N+M shard handles of one encoded source.
///
/// A shard is usable when its handle is present and it has not been marked
/// unavailable. Dropping the set closes every handle.
#[derive(Debug)]
pub struct ShardSet<S> {
    shards: Vec<Option<S>>,
    unavailable: Vec<bool>,
}

impl<S: BlockStore> ShardSet<S> {
    /// Every shard present and available
    pub fn new(shards: Vec<S>) -> Self {
        Self::from_optional(shards.into_iter().map(Some).collect())
    }

    /// Shards that are `None` count as unavailable
    pub fn from_optional(shards: Vec<Option<S>>) -> Self {
        let unavailable = shards.iter().map(Option::is_none).collect();
        Self {
            shards,
            unavailable,
        }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Flag a shard as unavailable (lost, or known to be corrupt)
    pub fn mark_unavailable(&mut self, shard: usize) {
        if let Some(flag) = self.unavailable.get_mut(shard) {
            *flag = true;
        }
    }

    /// Clear an unavailability flag; shards without a handle stay unavailable
    pub fn mark_available(&mut self, shard: usize) {
        if let (Some(flag), Some(Some(_))) =
            (self.unavailable.get_mut(shard), self.shards.get(shard))
        {
            *flag = false;
        }
    }

    pub fn is_available(&self, shard: usize) -> bool {
        self.get(shard).is_some()
    }

    /// Handle of an available shard
    pub fn get(&self, shard: usize) -> Option<&S> {
        match self.unavailable.get(shard) {
            Some(false) => self.shards[shard].as_ref(),
            _ => None,
        }
    }

    pub fn available_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_available(i)).collect()
    }

    pub fn unavailable_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| !self.is_available(i)).collect()
    }
}

// =============================================================================
// Shard Reader
// =============================================================================

/// Reads logical ranges of an encoded source from its shards
pub struct ShardReader<S> {
    geometry: EcGeometry,
    source_size: u64,
    layout: Layout,
    shards: ShardSet<S>,
    decoder: EcDecoder,
    selection: ShardSelection,
    rng: Option<Mutex<StdRng>>,
    metrics: Option<EcMetrics>,
}

impl<S: BlockStore> ShardReader<S> {
    /// Open a reader over `shards`, which must hold N+M entries.
    ///
    /// Every available shard must have exactly the length the geometry
    /// implies for `source_size`; anything else means the shards were
    /// encoded with different parameters.
    pub fn open(geometry: EcGeometry, source_size: u64, shards: ShardSet<S>) -> Result<Self> {
        if shards.len() != geometry.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                geometry.total_shards(),
                shards.len()
            )));
        }

        let expected = geometry.shard_size(source_size);
        for shard in shards.available_indices() {
            if let Some(store) = shards.get(shard) {
                let actual = store.size()?;
                if actual != expected {
                    return Err(Error::GeometryMismatch {
                        shard,
                        expected,
                        actual,
                    });
                }
            }
        }

        let unavailable = shards.unavailable_indices();
        if !unavailable.is_empty() {
            warn!(?unavailable, "Opening shard set with unavailable shards");
        }

        Ok(Self {
            decoder: EcDecoder::new(geometry.data_shards(), geometry.parity_shards())?,
            layout: geometry.layout(source_size),
            geometry,
            source_size,
            shards,
            selection: ShardSelection::LowestIndexed,
            rng: None,
            metrics: None,
        })
    }

    pub fn with_selection(mut self, selection: ShardSelection) -> Self {
        self.rng = match selection {
            ShardSelection::LowestIndexed => None,
            ShardSelection::Seeded(seed) => Some(Mutex::new(StdRng::seed_from_u64(seed))),
        };
        self.selection = selection;
        self
    }

    pub fn with_metrics(mut self, metrics: EcMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn geometry(&self) -> &EcGeometry {
        &self.geometry
    }

    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shards(&self) -> &ShardSet<S> {
        &self.shards
    }

    pub fn selection(&self) -> ShardSelection {
        self.selection
    }

    pub fn mark_unavailable(&mut self, shard: usize) {
        self.shards.mark_unavailable(shard);
    }

    pub fn mark_available(&mut self, shard: usize) {
        self.shards.mark_available(shard);
    }

    /// Intervals covering `[offset, offset + size)`, after a bounds check
    pub fn locate(&self, offset: u64, size: u64) -> Result<Vec<Interval>> {
        match offset.checked_add(size) {
            Some(end) if end <= self.source_size => {
                Ok(locate(&self.geometry, self.source_size, offset, size))
            }
            _ => Err(Error::OutOfRange {
                offset,
                size,
                source_size: self.source_size,
            }),
        }
    }

    /// Read `[offset, offset + size)` of the source.
    ///
    /// With `allow_reconstruct`, intervals whose shard is unavailable are
    /// rebuilt from survivors; otherwise they fail with `ShardUnavailable`.
    #[instrument(level = "debug", skip(self))]
    pub fn read(&self, offset: u64, size: u64, allow_reconstruct: bool) -> Result<Vec<u8>> {
        let mode = if allow_reconstruct {
            ReadMode::AllowReconstruct
        } else {
            ReadMode::Primary
        };
        self.read_with_mode(offset, size, mode)
    }

    /// Read a range through both the primary and the reconstruction path,
    /// failing with `ReconstructionMismatch` when they disagree.
    ///
    /// An available primary with fewer than N other survivors is served
    /// as-is, without the cross-check.
    #[instrument(level = "debug", skip(self))]
    pub fn read_verified(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.read_with_mode(offset, size, ReadMode::Verify)
    }

    pub fn read_with_mode(&self, offset: u64, size: u64, mode: ReadMode) -> Result<Vec<u8>> {
        let intervals = self.locate(offset, size)?;

        let mut data = Vec::with_capacity(size as usize);
        for interval in &intervals {
            data.extend_from_slice(&self.read_interval(interval, mode)?);
        }
        Ok(data)
    }

    /// Serve one interval
    pub fn read_interval(&self, interval: &Interval, mode: ReadMode) -> Result<Vec<u8>> {
        let (shard, offset) = interval.to_shard_and_offset(&self.geometry, self.layout.large_rows);
        let size = interval.size as usize;

        let data = match mode {
            ReadMode::Primary => self.read_shard(shard, offset, size)?,
            ReadMode::AllowReconstruct => {
                if self.shards.is_available(shard) {
                    self.read_shard(shard, offset, size)?
                } else {
                    self.recover_range(shard, offset, size)?
                }
            }
            ReadMode::Verify => {
                if !self.shards.is_available(shard) {
                    self.recover_range(shard, offset, size)?
                } else if self.survivors_excluding(shard) < self.geometry.data_shards() {
                    let primary = self.read_shard(shard, offset, size)?;
                    warn!(
                        shard,
                        offset,
                        size,
                        "Too few other shards to cross-check, serving primary bytes"
                    );
                    primary
                } else {
                    let recovered = self.recover_range(shard, offset, size)?;
                    let primary = self.read_shard(shard, offset, size)?;
                    if primary != recovered {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_mismatch();
                        }
                        warn!(shard, offset, size, "Reconstructed bytes differ from primary");
                        return Err(Error::ReconstructionMismatch {
                            shard,
                            offset,
                            size,
                        });
                    }
                    recovered
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_interval_read(interval.size);
        }
        Ok(data)
    }

    /// Read `size` bytes at `offset` from one available shard
    pub fn read_shard(&self, shard: usize, offset: u64, size: usize) -> Result<Vec<u8>> {
        let store = self
            .shards
            .get(shard)
            .ok_or(Error::ShardUnavailable { shard })?;

        let mut buf = vec![0u8; size];
        let actual = store.read_at(&mut buf, offset)?;
        if actual < size {
            return Err(Error::ShortRead {
                shard,
                offset,
                expected: size,
                actual,
            });
        }
        Ok(buf)
    }

    /// Rebuild `size` bytes at `offset` of shard `target` (data or parity)
    /// from N other shards
    pub fn recover_range(&self, target: usize, offset: u64, size: usize) -> Result<Vec<u8>> {
        let sources = self.select_sources(&[target])?;
        debug!(target, offset, size, ?sources, "Reconstructing range");

        let mut blocks = self.read_sources(&sources, offset, size)?;
        let data = self.decoder.recover(&mut blocks, target)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_reconstruction();
        }
        Ok(data)
    }

    /// Every shard's bytes for `[offset, offset + size)`, reconstructing the
    /// unavailable ones
    pub fn recover_all(&self, offset: u64, size: usize) -> Result<Vec<Vec<u8>>> {
        let missing = self.shards.unavailable_indices();
        let sources = self.select_sources(&missing)?;

        let mut blocks = self.read_sources(&sources, offset, size)?;
        if blocks.iter().any(Option::is_none) {
            self.decoder.reconstruct(&mut blocks)?;
        }
        if !missing.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_reconstruction();
            }
        }

        blocks
            .into_iter()
            .enumerate()
            .map(|(shard, block)| {
                block.ok_or_else(|| Error::EcReconstructionFailed {
                    shard,
                    reason: "codec left a slot empty".to_string(),
                })
            })
            .collect()
    }

    fn read_sources(
        &self,
        sources: &[usize],
        offset: u64,
        size: usize,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let mut blocks: Vec<Option<Vec<u8>>> = vec![None; self.geometry.total_shards()];
        for &shard in sources {
            blocks[shard] = Some(self.read_shard(shard, offset, size)?);
        }
        Ok(blocks)
    }

    /// Pick N available shards, none of them in `exclude`
    fn survivors_excluding(&self, shard: usize) -> usize {
        self.shards
            .available_indices()
            .into_iter()
            .filter(|&i| i != shard)
            .count()
    }

    fn select_sources(&self, exclude: &[usize]) -> Result<Vec<usize>> {
        let required = self.geometry.data_shards();
        let candidates: Vec<usize> = self
            .shards
            .available_indices()
            .into_iter()
            .filter(|i| !exclude.contains(i))
            .collect();

        if candidates.len() < required {
            return Err(Error::InsufficientShards {
                available: candidates.len(),
                required,
            });
        }

        let mut chosen = match &self.rng {
            None => candidates[..required].to_vec(),
            Some(rng) => {
                let mut rng = rng.lock();
                candidates
                    .choose_multiple(&mut *rng, required)
                    .copied()
                    .collect()
            }
        };
        chosen.sort_unstable();
        Ok(chosen)
    }
}

impl<S> std::fmt::Debug for ShardReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardReader")
            .field("geometry", &self.geometry)
            .field("source_size", &self.source_size)
            .field("selection", &self.selection)
            .finish()
    }
}
