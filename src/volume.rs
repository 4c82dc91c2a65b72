//! Volume Files
//!
//! File-level operations on one erasure-coded volume. A volume is addressed
//! by its base path; its files sit next to each other:
//!
//! ```text
//! <base>.dat          source (record file)
//! <base>.ec01 ..      N data shards then M parity shards
//! <base>.ecx          sorted record index
//! <base>.ecm          manifest (geometry + source size)
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::adapters::{
    create_shard_files, index_file_name, manifest_file_name, open_shard_files,
    remove_shard_files, shard_file_name, source_file_name, FileBlockStore,
};
use crate::config::EcConfig;
use crate::domain::ports::BlockStore;
use crate::ec::encoder::storage_overhead;
use crate::ec::metadata::EcManifest;
use crate::ec::reconstruction::{ShardReader, ShardSelection, ShardSet};
use crate::ec::repair::{decode_source, rebuild_missing_shards, RebuildSummary};
use crate::ec::shard_encoder::ShardEncoder;
use crate::ec::verify::{Verifier, VerifyReport};
use crate::error::{Error, Result};
use crate::index::SortedIndex;
use crate::metrics::EcMetrics;

/// One volume on disk
#[derive(Debug, Clone)]
pub struct Volume {
    base: PathBuf,
}

impl Volume {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn source_path(&self) -> PathBuf {
        source_file_name(&self.base)
    }

    pub fn shard_path(&self, shard: usize) -> PathBuf {
        shard_file_name(&self.base, shard)
    }

    pub fn index_path(&self) -> PathBuf {
        index_file_name(&self.base)
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_file_name(&self.base)
    }

    pub fn manifest(&self) -> Result<EcManifest> {
        EcManifest::load(self.manifest_path())
    }

    /// Encode `<base>.dat` into shard files and write the manifest.
    ///
    /// Shard files left behind by a failed encode or manifest write are
    /// removed.
    #[instrument(skip(self, config, metrics), fields(base = %self.base.display()))]
    pub fn encode(&self, config: &EcConfig, metrics: Option<&EcMetrics>) -> Result<EcManifest> {
        let geometry = config.geometry()?;
        let source = FileBlockStore::open(self.source_path())?;
        let shards = create_shard_files(&self.base, geometry.total_shards())?;

        let mut encoder =
            ShardEncoder::new(geometry, config.buffer_size)?.with_workers(config.workers);
        if let Some(metrics) = metrics {
            encoder = encoder.with_metrics(metrics.clone());
        }

        let outcome = encoder.encode(&source, &shards).and_then(|summary| {
            let manifest = EcManifest::new(&geometry, summary.source_size);
            manifest.save(self.manifest_path())?;
            Ok((summary, manifest))
        });
        let (summary, manifest) = match outcome {
            Ok(done) => done,
            Err(e) => {
                drop(shards);
                if let Err(cleanup) = remove_shard_files(&self.base, geometry.total_shards()) {
                    warn!(error = %cleanup, "Failed to remove partial shard files");
                }
                return Err(e);
            }
        };

        info!(
            source_size = summary.source_size,
            shard_size = summary.shard_size,
            overhead = storage_overhead(geometry.data_shards(), geometry.parity_shards()),
            "Volume encoded"
        );
        Ok(manifest)
    }

    /// Open the shards for reading.
    ///
    /// Missing shard files and the shards listed in `unavailable` are both
    /// treated as unavailable. Listing a shard the volume does not have is
    /// an `InvalidEcConfig` error.
    pub fn open_reader(
        &self,
        selection: ShardSelection,
        unavailable: &[usize],
    ) -> Result<ShardReader<FileBlockStore>> {
        let manifest = self.manifest()?;
        let geometry = manifest.geometry()?;

        if let Some(&shard) = unavailable.iter().find(|&&s| s >= geometry.total_shards()) {
            return Err(Error::InvalidEcConfig(format!(
                "Shard {} does not exist, volume has {} shards",
                shard,
                geometry.total_shards()
            )));
        }

        let mut shards =
            ShardSet::from_optional(open_shard_files(&self.base, geometry.total_shards())?);
        for &shard in unavailable {
            shards.mark_unavailable(shard);
        }

        Ok(ShardReader::open(geometry, manifest.source_size, shards)?.with_selection(selection))
    }

    /// Sort an index log and write it as `<base>.ecx`
    #[instrument(skip(self, log_path), fields(base = %self.base.display()))]
    pub fn build_index(&self, log_path: impl AsRef<Path>) -> Result<SortedIndex> {
        let log = std::fs::File::open(log_path)?;
        let index = SortedIndex::from_log(std::io::BufReader::new(log))?;
        index.save(self.index_path())?;
        info!(records = index.len(), "Wrote sorted index");
        Ok(index)
    }

    /// Compare every record of `<base>.ecx` between source and shards
    pub fn verify(
        &self,
        config: &EcConfig,
        unavailable: &[usize],
        metrics: Option<&EcMetrics>,
    ) -> Result<VerifyReport> {
        let reader = self.open_reader(config.selection, unavailable)?;
        let source = FileBlockStore::open(self.source_path())?;
        if source.size()? < reader.source_size() {
            return Err(Error::Config(format!(
                "source {} is shorter than the encoded size {}",
                self.source_path().display(),
                reader.source_size()
            )));
        }

        let index = SortedIndex::load(self.index_path())?;
        index.check_bounds(reader.source_size())?;

        let mut verifier = Verifier::new(&reader, &source).with_workers(config.workers);
        if let Some(metrics) = metrics {
            verifier = verifier.with_metrics(metrics.clone());
        }
        verifier.verify(&index)
    }

    /// Regenerate every missing shard file plus the shards in `unavailable`.
    ///
    /// Each shard is written to a temporary file and renamed into place once
    /// the whole rebuild succeeded.
    #[instrument(skip(self, config, metrics), fields(base = %self.base.display()))]
    pub fn rebuild(
        &self,
        config: &EcConfig,
        unavailable: &[usize],
        metrics: Option<&EcMetrics>,
    ) -> Result<RebuildSummary> {
        let reader = self.open_reader(config.selection, unavailable)?;
        let missing = reader.shards().unavailable_indices();
        if missing.is_empty() {
            info!("No shards to rebuild");
            return Ok(RebuildSummary {
                shards: Vec::new(),
                rows: 0,
                shard_size: reader.geometry().shard_size(reader.source_size()),
            });
        }

        let mut targets = Vec::with_capacity(missing.len());
        for &shard in &missing {
            let store = FileBlockStore::create(temp_path(&self.shard_path(shard)))
                .map_err(|source| Error::EncodeWriteFailure { shard, source })?;
            targets.push((shard, store));
        }

        let summary = match rebuild_missing_shards(&reader, &targets, config.buffer_size, metrics)
        {
            Ok(summary) => summary,
            Err(e) => {
                for (shard, _) in &targets {
                    let _ = std::fs::remove_file(temp_path(&self.shard_path(*shard)));
                }
                return Err(e);
            }
        };
        drop(targets);
        drop(reader);

        for &shard in &missing {
            let path = self.shard_path(shard);
            std::fs::rename(temp_path(&path), &path)?;
        }
        Ok(summary)
    }

    /// Reassemble the source from the shards into `output`
    pub fn decode(
        &self,
        output: impl AsRef<Path>,
        config: &EcConfig,
        unavailable: &[usize],
    ) -> Result<u64> {
        let reader = self.open_reader(config.selection, unavailable)?;
        let sink = FileBlockStore::create(output)?;
        decode_source(&reader, &sink, config.buffer_size)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> EcConfig {
        EcConfig {
            data_shards: 4,
            parity_shards: 2,
            large_block_size: 256,
            small_block_size: 16,
            buffer_size: 64,
            ..EcConfig::default()
        }
    }

    fn volume_with_source(dir: &Path, len: usize) -> (Volume, Vec<u8>) {
        let volume = Volume::new(dir.join("7"));
        let data: Vec<u8> = (0..len).map(|i| (i * 11 + i / 5) as u8).collect();
        std::fs::write(volume.source_path(), &data).unwrap();
        (volume, data)
    }

    #[test]
    fn test_encode_writes_shards_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (volume, _) = volume_with_source(dir.path(), 3_000);

        let manifest = volume.encode(&config(), None).unwrap();
        assert_eq!(manifest.source_size, 3_000);

        for shard in 0..6 {
            let len = std::fs::metadata(volume.shard_path(shard)).unwrap().len();
            assert_eq!(len, manifest.shard_size);
        }
        assert_eq!(volume.manifest().unwrap(), manifest);
    }

    #[test]
    fn test_encode_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let volume = Volume::new(dir.path().join("missing"));

        assert_matches!(volume.encode(&config(), None), Err(Error::Io(_)));
        assert!(!volume.manifest_path().exists());
    }

    #[test]
    fn test_failed_manifest_write_removes_shards() {
        let dir = tempfile::tempdir().unwrap();
        let (volume, _) = volume_with_source(dir.path(), 3_000);
        // A directory in the manifest's place makes the final rename fail
        std::fs::create_dir(volume.manifest_path()).unwrap();
        std::fs::write(volume.manifest_path().join("keep"), b"x").unwrap();

        assert!(volume.encode(&config(), None).is_err());
        for shard in 0..6 {
            assert!(!volume.shard_path(shard).exists());
        }
    }

    #[test]
    fn test_open_reader_rejects_unknown_shard() {
        let dir = tempfile::tempdir().unwrap();
        let (volume, data) = volume_with_source(dir.path(), 1_000);
        volume.encode(&config(), None).unwrap();

        assert_matches!(
            volume.open_reader(ShardSelection::LowestIndexed, &[2, 6]),
            Err(Error::InvalidEcConfig(_))
        );
        assert_matches!(
            volume.decode(dir.path().join("out.dat"), &config(), &[14]),
            Err(Error::InvalidEcConfig(_))
        );

        let reader = volume
            .open_reader(ShardSelection::LowestIndexed, &[5])
            .unwrap();
        assert_eq!(reader.read(0, 1_000, false).unwrap(), data);
    }

    #[test]
    fn test_rebuild_deleted_shards() {
        let dir = tempfile::tempdir().unwrap();
        let (volume, _) = volume_with_source(dir.path(), 2_500);
        volume.encode(&config(), None).unwrap();

        let original_1 = std::fs::read(volume.shard_path(1)).unwrap();
        let original_4 = std::fs::read(volume.shard_path(4)).unwrap();
        std::fs::remove_file(volume.shard_path(1)).unwrap();
        std::fs::remove_file(volume.shard_path(4)).unwrap();

        let summary = volume.rebuild(&config(), &[], None).unwrap();
        assert_eq!(summary.shards, vec![1, 4]);
        assert_eq!(std::fs::read(volume.shard_path(1)).unwrap(), original_1);
        assert_eq!(std::fs::read(volume.shard_path(4)).unwrap(), original_4);
        assert!(!temp_path(&volume.shard_path(1)).exists());
    }

    #[test]
    fn test_decode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (volume, data) = volume_with_source(dir.path(), 1_111);
        volume.encode(&config(), None).unwrap();
        std::fs::remove_file(volume.shard_path(0)).unwrap();

        let out = dir.path().join("decoded.dat");
        assert_eq!(volume.decode(&out, &config(), &[]).unwrap(), 1_111);
        assert_eq!(std::fs::read(&out).unwrap(), data);
    }
}
