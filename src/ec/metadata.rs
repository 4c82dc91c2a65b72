//! EC Metadata
//!
//! The manifest written next to the shard files of an encoded source. It
//! records the geometry and source size so later reads, verification and
//! repair runs use exactly the parameters the encode used.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::ec::geometry::EcGeometry;
use crate::error::{Error, Result};

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Description of one encoded source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcManifest {
    /// Format version
    pub version: u32,

    /// Number of data shards (N)
    pub data_shards: usize,

    /// Number of parity shards (M)
    pub parity_shards: usize,

    /// Large block size (L)
    pub large_block_size: u64,

    /// Small block size (S)
    pub small_block_size: u64,

    /// Length of the source file in bytes
    pub source_size: u64,

    /// Length every shard file must have
    pub shard_size: u64,

    /// When the encode finished
    pub encoded_at: DateTime<Utc>,
}

impl EcManifest {
    /// Describe a source of `source_size` bytes encoded with `geometry`
    pub fn new(geometry: &EcGeometry, source_size: u64) -> Self {
        Self {
            version: MANIFEST_VERSION,
            data_shards: geometry.data_shards(),
            parity_shards: geometry.parity_shards(),
            large_block_size: geometry.large_block_size(),
            small_block_size: geometry.small_block_size(),
            source_size,
            shard_size: geometry.shard_size(source_size),
            encoded_at: Utc::now(),
        }
    }

    /// Geometry the source was encoded with
    pub fn geometry(&self) -> Result<EcGeometry> {
        let geometry = EcGeometry::new(
            self.data_shards,
            self.parity_shards,
            self.large_block_size,
            self.small_block_size,
        )?;

        let expected = geometry.shard_size(self.source_size);
        if expected != self.shard_size {
            return Err(Error::Config(format!(
                "manifest shard_size {} disagrees with geometry ({} expected)",
                self.shard_size, expected
            )));
        }
        Ok(geometry)
    }

    /// Write the manifest as JSON, replacing any previous one atomically
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("ecm.tmp");

        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;

        debug!(source_size = self.source_size, "saved EC manifest");
        Ok(())
    }

    /// Read a manifest written by [`EcManifest::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(&std::fs::read(path)?)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::Config(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.ecm");

        let geometry = EcGeometry::new(10, 4, 10_000, 100).unwrap();
        let manifest = EcManifest::new(&geometry, 100_001);
        assert_eq!(manifest.shard_size, 10_100);

        manifest.save(&path).unwrap();
        let loaded = EcManifest::load(&path).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.geometry().unwrap(), geometry);
    }

    #[test]
    fn test_manifest_inconsistent_shard_size() {
        let geometry = EcGeometry::new(4, 2, 1000, 10).unwrap();
        let mut manifest = EcManifest::new(&geometry, 5000);
        manifest.shard_size += 1;

        assert!(matches!(manifest.geometry(), Err(Error::Config(_))));
    }

    #[test]
    fn test_manifest_bad_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.ecm");

        let geometry = EcGeometry::new(4, 2, 1000, 10).unwrap();
        let mut manifest = EcManifest::new(&geometry, 5000);
        manifest.version = 99;
        manifest.save(&path).unwrap();

        assert!(matches!(EcManifest::load(&path), Err(Error::Config(_))));
    }
}
