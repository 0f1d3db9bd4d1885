//! Fixed-size page volumes.
//!
//! A volume is a pre-sized file of `capacity × 4096` bytes with no
//! header: block `i` occupies bytes `[i·4096, (i+1)·4096)`. The append
//! cursor lives in memory; the meta-volume is the durable record of how
//! far each volume is filled, and [`Volume::open_existing`] takes the
//! replayed fill position from it.
//!
//! `reset()` only rewinds the cursor. Old page contents stay on disk and
//! are overwritten lazily, which is what makes rotation cheap.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::block::BLOCK_SIZE;
use crate::error::{Error, Result};

pub struct Volume {
    file: File,
    path: PathBuf,
    capacity: u32,
    write_pos: u32,
}

impl Volume {
    /// Create a new volume file sized for `capacity` blocks.
    pub async fn create_new<P: AsRef<Path>>(path: P, capacity: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.set_len(capacity as u64 * BLOCK_SIZE as u64).await?;
        file.sync_all().await?;

        debug!(path = ?path, capacity, "volume created");

        Ok(Self {
            file,
            path,
            capacity,
            write_pos: 0,
        })
    }

    /// Open an existing volume with its append cursor at `pos`.
    ///
    /// Capacity is derived from the file length, which must be a whole
    /// number of blocks.
    pub async fn open_existing<P: AsRef<Path>>(path: P, pos: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path).await?;

        let len = file.metadata().await?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::Corrupt(format!(
                "volume {} is {} bytes, not a whole number of blocks",
                path.display(),
                len
            )));
        }
        let capacity = (len / BLOCK_SIZE as u64) as u32;
        if pos > capacity {
            return Err(Error::Corrupt(format!(
                "volume {} fill position {} exceeds capacity {}",
                path.display(),
                pos,
                capacity
            )));
        }

        debug!(path = ?path, capacity, pos, "volume opened");

        Ok(Self {
            file,
            path,
            capacity,
            write_pos: pos,
        })
    }

    /// Write one page at the cursor; returns the block index.
    pub async fn append_block(&mut self, data: &[u8]) -> Result<u32> {
        if data.len() != BLOCK_SIZE {
            return Err(Error::BadBlockSize {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        if self.write_pos >= self.capacity {
            return Err(Error::VolumeOverflow);
        }
        self.file
            .seek(SeekFrom::Start(self.write_pos as u64 * BLOCK_SIZE as u64))
            .await?;
        self.file.write_all(data).await?;

        let index = self.write_pos;
        self.write_pos += 1;
        Ok(index)
    }

    /// Random-read one page into `dest` (which must be one block long).
    pub async fn read_block(&mut self, index: u32, dest: &mut [u8]) -> Result<()> {
        if dest.len() != BLOCK_SIZE {
            return Err(Error::BadBlockSize {
                expected: BLOCK_SIZE,
                actual: dest.len(),
            });
        }
        if index >= self.capacity {
            return Err(Error::UnknownAddr(index as u64));
        }
        self.file
            .seek(SeekFrom::Start(index as u64 * BLOCK_SIZE as u64))
            .await?;
        self.file.read_exact(dest).await?;
        Ok(())
    }

    /// Rewind the cursor; no truncation.
    pub fn reset(&mut self) {
        self.write_pos = 0;
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file.sync_all().await?;
        Ok(())
    }

    /// Capacity in blocks.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
