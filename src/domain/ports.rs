//! Domain Ports (Port/Adapter Pattern)
//!
//! Core abstractions the erasure-coding logic depends on. Adapters in
//! [`crate::adapters`] provide file-backed and in-memory implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │     BlockStore  │  BlockSink  │  RecordIndex         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │      FileBlockStore  │  MemoryBlockStore  │ SortedIndex │  │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// A record's location in the logical source file.
///
/// Owned by the external record index; the core only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record key
    pub key: u64,
    /// Byte offset of the record in the source
    pub offset: u64,
    /// Record length in bytes
    pub size: u32,
}

impl RecordRef {
    pub fn new(key: u64, offset: u64, size: u32) -> Self {
        Self { key, offset, size }
    }

    /// Offset one past the record's last byte
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

// =============================================================================
// Block Store Ports
// =============================================================================

/// Read side of a shard (or of the source file).
///
/// Implementations must tolerate concurrent `read_at` calls from several
/// threads; the read path shares one handle per shard.
pub trait BlockStore: Send + Sync {
    /// Current length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Read up to `buf.len()` bytes at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than `buf.len()`
    /// only when the store ends first.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Write side of a shard.
///
/// Writes are positional so that workers owning disjoint row ranges can
/// write concurrently without disturbing per-shard row order.
pub trait BlockSink: Send + Sync {
    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()>;

    /// Flush buffered data to durable storage
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: BlockStore + ?Sized> BlockStore for Arc<T> {
    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<T: BlockStore + ?Sized> BlockStore for Box<T> {
    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<T: BlockSink + ?Sized> BlockSink for Arc<T> {
    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_at(data, offset)
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

impl<T: BlockSink + ?Sized> BlockSink for Box<T> {
    fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_at(data, offset)
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Fill `buf` from `store` at `offset`, zero-padding past the end of the
/// store. Returns how many bytes came from the store.
pub fn read_padded<S: BlockStore + ?Sized>(
    store: &S,
    buf: &mut [u8],
    offset: u64,
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = store.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf[filled..].fill(0);
    Ok(filled)
}

// =============================================================================
// Record Index Port
// =============================================================================

/// Source of every record reference of an encoded volume.
///
/// Consumed by verification and repair flows only.
pub trait RecordIndex: Send + Sync {
    /// Number of records
    fn record_count(&self) -> usize;

    /// Visit every record in ascending offset order, stopping at the first
    /// error returned by `visit`.
    fn ascending_visit(&self, visit: &mut dyn FnMut(&RecordRef) -> Result<()>) -> Result<()>;
}
