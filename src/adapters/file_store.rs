//! File-Backed Block Store
//!
//! Shards, source and index files of a volume live next to each other and
//! share a base path:
//!
//! ```text
//! <base>.dat            source file
//! <base>.ec01 .. .ecNN  shard files, one per shard index (1-based)
//! <base>.ecx            sorted record index
//! <base>.ecm            encode manifest (JSON)
//! ```

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::ports::{BlockSink, BlockStore};
use crate::error::{Error, Result};

/// A shard or source file opened for positional I/O
#[derive(Debug)]
pub struct FileBlockStore {
    file: File,
    path: PathBuf,
}

impl FileBlockStore {
    /// Open an existing file read-only
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { file, path })
    }

    /// Create (or truncate) a file for writing
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockStore for FileBlockStore {
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.seek_read(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl BlockSink for FileBlockStore {
    #[cfg(unix)]
    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(data, offset)
    }

    #[cfg(windows)]
    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        let mut written = 0;
        while written < data.len() {
            match self.file.seek_write(&data[written..], offset + written as u64) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

// =============================================================================
// Naming
// =============================================================================

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the shard with zero-based `index`
pub fn shard_file_name(base: &Path, index: usize) -> PathBuf {
    with_suffix(base, &format!(".ec{:02}", index + 1))
}

pub fn source_file_name(base: &Path) -> PathBuf {
    with_suffix(base, ".dat")
}

pub fn index_file_name(base: &Path) -> PathBuf {
    with_suffix(base, ".ecx")
}

pub fn manifest_file_name(base: &Path) -> PathBuf {
    with_suffix(base, ".ecm")
}

/// Create (truncating) every shard file of a volume
pub fn create_shard_files(base: &Path, total_shards: usize) -> Result<Vec<FileBlockStore>> {
    (0..total_shards)
        .map(|i| {
            FileBlockStore::create(shard_file_name(base, i))
                .map_err(|source| Error::EncodeWriteFailure { shard: i, source })
        })
        .collect()
}

/// Open every shard file of a volume; missing files come back as `None`
pub fn open_shard_files(base: &Path, total_shards: usize) -> Result<Vec<Option<FileBlockStore>>> {
    let mut shards = Vec::with_capacity(total_shards);
    for i in 0..total_shards {
        let path = shard_file_name(base, i);
        match FileBlockStore::open(&path) {
            Ok(store) => shards.push(Some(store)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(shard = i, path = %path.display(), "shard file missing");
                shards.push(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(shards)
}

/// Remove every shard file of a volume, ignoring ones already gone
pub fn remove_shard_files(base: &Path, total_shards: usize) -> Result<()> {
    for i in 0..total_shards {
        match std::fs::remove_file(shard_file_name(base, i)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming() {
        let base = Path::new("/data/vol/1");
        assert_eq!(shard_file_name(base, 0), PathBuf::from("/data/vol/1.ec01"));
        assert_eq!(shard_file_name(base, 13), PathBuf::from("/data/vol/1.ec14"));
        assert_eq!(source_file_name(base), PathBuf::from("/data/vol/1.dat"));
        assert_eq!(index_file_name(base), PathBuf::from("/data/vol/1.ecx"));
        assert_eq!(manifest_file_name(base), PathBuf::from("/data/vol/1.ecm"));
    }

    #[test]
    fn test_file_roundtrip_and_missing_shards() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("7");

        let created = create_shard_files(&base, 3).unwrap();
        created[1].write_at(b"abc", 4).unwrap();
        drop(created);

        std::fs::remove_file(shard_file_name(&base, 2)).unwrap();

        let opened = open_shard_files(&base, 3).unwrap();
        assert!(opened[0].is_some());
        assert!(opened[2].is_none());

        let store = opened[1].as_ref().unwrap();
        assert_eq!(store.size().unwrap(), 7);
        let mut buf = [0u8; 7];
        assert_eq!(store.read_at(&mut buf, 0).unwrap(), 7);
        assert_eq!(&buf, b"\0\0\0\0abc");

        remove_shard_files(&base, 3).unwrap();
        assert!(open_shard_files(&base, 3).unwrap().iter().all(Option::is_none));
    }
}
