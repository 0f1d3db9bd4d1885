//! In-memory block store.
//!
//! Same contract as the file-backed store, no files, no rotation:
//! addresses are dense integers on top of a fixed non-zero base (a
//! zero base would let zero-initialized address bugs pass unnoticed in
//! tests). A logical `remove` watermark makes a prefix of the address
//! space unreadable, which is how tests simulate data aging out.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::block::{Block, LogicAddr, BLOCK_SIZE};
use crate::blockstore::{BlockStore, StoreStats};
use crate::error::{Error, Result};

/// First address handed out.
pub const MEMSTORE_BASE: LogicAddr = 1031;

/// Nominal capacity reported by [`MemStore::stats`]; the buffer itself
/// grows without bound.
const NOMINAL_CAPACITY: u64 = 1024;

type AppendCallback = Box<dyn Fn(LogicAddr) + Send + Sync>;

struct MemInner {
    buffer: Vec<u8>,
    write_pos: u32,
    removed_pos: u64,
}

pub struct MemStore {
    inner: Mutex<MemInner>,
    append_callback: Option<AppendCallback>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemInner {
                buffer: Vec::new(),
                write_pos: 0,
                removed_pos: 0,
            }),
            append_callback: None,
        }
    }

    /// A store that synchronously reports every append, used to drive
    /// test-side observers.
    pub fn with_append_callback<F>(callback: F) -> Self
    where
        F: Fn(LogicAddr) + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::new(MemInner {
                buffer: Vec::new(),
                write_pos: 0,
                removed_pos: 0,
            }),
            append_callback: Some(Box::new(callback)),
        }
    }

    /// Make every block below base-relative position `pos` unreadable.
    pub async fn remove(&self, pos: u64) {
        self.inner.lock().await.removed_pos = pos;
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemStore {
    async fn append_block(&self, data: &[u8]) -> Result<LogicAddr> {
        if data.len() != BLOCK_SIZE {
            return Err(Error::BadBlockSize {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        let mut inner = self.inner.lock().await;
        inner.buffer.extend_from_slice(data);
        let addr = inner.write_pos as u64 + MEMSTORE_BASE;
        if let Some(callback) = &self.append_callback {
            callback(addr);
        }
        inner.write_pos += 1;
        Ok(addr)
    }

    async fn read_block(&self, addr: LogicAddr) -> Result<Arc<Block>> {
        let pos = addr
            .checked_sub(MEMSTORE_BASE)
            .ok_or(Error::UnknownAddr(addr))?;
        let inner = self.inner.lock().await;
        let offset = pos as usize * BLOCK_SIZE;
        if inner.buffer.len() < offset + BLOCK_SIZE {
            return Err(Error::UnknownAddr(addr));
        }
        if pos < inner.removed_pos {
            return Err(Error::UnknownAddr(addr));
        }
        let data = inner.buffer[offset..offset + BLOCK_SIZE].to_vec();
        Ok(Arc::new(Block::new(addr, data)))
    }

    async fn exists(&self, addr: LogicAddr) -> bool {
        let Some(pos) = addr.checked_sub(MEMSTORE_BASE) else {
            return false;
        };
        let inner = self.inner.lock().await;
        pos < inner.write_pos as u64
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().await;
        StoreStats {
            block_size: BLOCK_SIZE as u32,
            capacity: NOMINAL_CAPACITY,
            nblocks: inner.write_pos as u64,
        }
    }

    fn checksum(&self, data: &[u8]) -> u32 {
        crc32c::crc32c(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn page(fill: u8) -> Vec<u8> {
        vec![fill; BLOCK_SIZE]
    }

    #[tokio::test]
    async fn test_append_read_roundtrip() {
        let store = MemStore::new();
        let addr = store.append_block(&page(0x11)).await.unwrap();
        assert_eq!(addr, MEMSTORE_BASE);
        assert!(store.exists(addr).await);

        let block = store.read_block(addr).await.unwrap();
        assert_eq!(block.addr(), addr);
        assert_eq!(block.data(), page(0x11).as_slice());
    }

    #[tokio::test]
    async fn test_addresses_are_not_zero_based() {
        let store = MemStore::new();
        let addr = store.append_block(&page(1)).await.unwrap();
        assert_ne!(addr, 0);
        assert!(!store.exists(0).await);
        assert!(store.read_block(0).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_watermark() {
        let store = MemStore::new();
        for i in 0..8u8 {
            store.append_block(&page(i)).await.unwrap();
        }
        store.remove(5).await;

        assert!(matches!(
            store.read_block(MEMSTORE_BASE + 3).await,
            Err(Error::UnknownAddr(_))
        ));
        let block = store.read_block(MEMSTORE_BASE + 6).await.unwrap();
        assert_eq!(block.data()[0], 6);
    }

    #[tokio::test]
    async fn test_append_callback_fires_synchronously() {
        let seen = Arc::new(AtomicU64::new(0));
        let store = {
            let seen = Arc::clone(&seen);
            MemStore::with_append_callback(move |addr| {
                seen.store(addr, Ordering::SeqCst);
            })
        };

        let addr = store.append_block(&page(0)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), addr);
    }

    #[tokio::test]
    async fn test_stats_track_appends() {
        let store = MemStore::new();
        store.append_block(&page(0)).await.unwrap();
        store.append_block(&page(1)).await.unwrap();
        let stats = store.stats().await;
        assert_eq!(stats.block_size as usize, BLOCK_SIZE);
        assert_eq!(stats.nblocks, 2);
    }
}
