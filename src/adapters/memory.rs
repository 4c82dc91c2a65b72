//! In-Memory Block Store
//!
//! A growable byte buffer implementing both [`BlockStore`] and [`BlockSink`].
//! Used by tests and by callers that keep small volumes entirely in memory.

use std::io;

use parking_lot::RwLock;

use crate::domain::ports::{BlockSink, BlockStore};

/// Shared in-memory shard
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    data: RwLock<Vec<u8>>,
}

impl MemoryBlockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `data`
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Copy of the current contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Flip every bit of the byte at `offset` (for corruption tests)
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(b) = self.data.write().get_mut(offset) {
            *b = !*b;
        }
    }

    /// Cut the store down to `len` bytes
    pub fn truncate(&self, len: usize) {
        self.data.write().truncate(len);
    }
}

impl BlockStore for MemoryBlockStore {
    fn size(&self) -> io::Result<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.read();
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

impl BlockSink for MemoryBlockStore {
    fn write_at(&self, bytes: &[u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = start + bytes.len();

        let mut data = self.data.write();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let store = MemoryBlockStore::new();
        store.write_at(b"hello", 0).unwrap();
        store.write_at(b"world", 10).unwrap();

        assert_eq!(store.size().unwrap(), 15);

        let mut buf = [0u8; 15];
        assert_eq!(store.read_at(&mut buf, 0).unwrap(), 15);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(&buf[5..10], &[0u8; 5]);
        assert_eq!(&buf[10..], b"world");
    }

    #[test]
    fn test_short_read_at_end() {
        let store = MemoryBlockStore::from_vec(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(store.read_at(&mut buf, 1).unwrap(), 2);
        assert_eq!(store.read_at(&mut buf, 99).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_byte() {
        let store = MemoryBlockStore::from_vec(vec![0x0F]);
        store.corrupt_byte(0);
        assert_eq!(store.to_vec(), vec![0xF0]);
    }
}
