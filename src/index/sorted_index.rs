//! Sorted Record Index
//!
//! Builds an ascending-offset view over record references supplied in any
//! order. Index files use fixed 20-byte big-endian entries:
//!
//! ```text
//! | key: u64 | offset: u64 | size: u32 |
//! ```
//!
//! An index *log* is append-only: entries may appear in any order, a later
//! entry for a key replaces the earlier one and `size == 0` deletes the key.
//! A *sorted* index file holds the surviving entries ordered by offset.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use tracing::{debug, instrument};

use crate::domain::ports::{RecordIndex, RecordRef};
use crate::error::{Error, Result};

/// Size of one encoded index entry
pub const ENTRY_SIZE: usize = 20;

fn encode_entry(record: &RecordRef) -> [u8; ENTRY_SIZE] {
    let mut entry = [0u8; ENTRY_SIZE];
    entry[0..8].copy_from_slice(&record.key.to_be_bytes());
    entry[8..16].copy_from_slice(&record.offset.to_be_bytes());
    entry[16..20].copy_from_slice(&record.size.to_be_bytes());
    entry
}

fn decode_entry(entry: &[u8; ENTRY_SIZE]) -> RecordRef {
    let mut key = [0u8; 8];
    let mut offset = [0u8; 8];
    let mut size = [0u8; 4];
    key.copy_from_slice(&entry[0..8]);
    offset.copy_from_slice(&entry[8..16]);
    size.copy_from_slice(&entry[16..20]);

    RecordRef {
        key: u64::from_be_bytes(key),
        offset: u64::from_be_bytes(offset),
        size: u32::from_be_bytes(size),
    }
}

/// Read every entry of an index stream
fn read_entries<R: Read>(mut reader: R) -> Result<Vec<RecordRef>> {
    let mut entries = Vec::new();
    let mut entry = [0u8; ENTRY_SIZE];

    loop {
        let mut filled = 0;
        while filled < ENTRY_SIZE {
            match reader.read(&mut entry[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => return Ok(entries),
            ENTRY_SIZE => entries.push(decode_entry(&entry)),
            partial => {
                return Err(Error::Index(format!(
                    "truncated entry after {} records ({} of {} bytes)",
                    entries.len(),
                    partial,
                    ENTRY_SIZE
                )))
            }
        }
    }
}

/// Record references in ascending offset order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedIndex {
    records: Vec<RecordRef>,
}

impl SortedIndex {
    /// Sort an arbitrary enumeration of record references.
    ///
    /// Ties on offset are broken by key; exact duplicates collapse.
    pub fn build(records: impl IntoIterator<Item = RecordRef>) -> Self {
        let mut records: Vec<RecordRef> = records.into_iter().collect();
        records.sort_unstable_by_key(|r| (r.offset, r.key, r.size));
        records.dedup();
        Self { records }
    }

    /// Replay an append-only index log
    #[instrument(skip(reader))]
    pub fn from_log<R: Read>(reader: R) -> Result<Self> {
        let entries = read_entries(reader)?;
        let total = entries.len();

        let mut live: HashMap<u64, RecordRef> = HashMap::with_capacity(total);
        for entry in entries {
            if entry.size == 0 {
                live.remove(&entry.key);
            } else {
                live.insert(entry.key, entry);
            }
        }

        debug!(log_entries = total, live = live.len(), "Replayed index log");
        Ok(Self::build(live.into_values()))
    }

    /// Load a sorted index stream, rejecting out-of-order entries
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let records = read_entries(reader)?;
        if let Some(pos) = records.windows(2).position(|w| w[0].offset > w[1].offset) {
            return Err(Error::Index(format!(
                "entry {} is out of offset order",
                pos + 1
            )));
        }
        Ok(Self { records })
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for record in &self.records {
            writer.write_all(&encode_entry(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the sorted index to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    /// Load a sorted index file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordRef> {
        self.records.iter()
    }

    pub fn records(&self) -> &[RecordRef] {
        &self.records
    }

    /// Fail when any record extends past the end of the source
    pub fn check_bounds(&self, source_size: u64) -> Result<()> {
        match self.records.iter().find(|r| r.end() > source_size) {
            Some(r) => Err(Error::OutOfRange {
                offset: r.offset,
                size: u64::from(r.size),
                source_size,
            }),
            None => Ok(()),
        }
    }
}

impl RecordIndex for SortedIndex {
    fn record_count(&self) -> usize {
        self.records.len()
    }

    fn ascending_visit(&self, visit: &mut dyn FnMut(&RecordRef) -> Result<()>) -> Result<()> {
        for record in &self.records {
            visit(record)?;
        }
        Ok(())
    }
}

impl FromIterator<RecordRef> for SortedIndex {
    fn from_iter<T: IntoIterator<Item = RecordRef>>(iter: T) -> Self {
        Self::build(iter)
    }
}
