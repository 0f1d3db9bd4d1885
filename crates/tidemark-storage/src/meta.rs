//! The meta-volume: durable per-volume bookkeeping.
//!
//! One small file records, for every volume in the fleet, how large it
//! is, how far it is filled, and which generation its contents belong
//! to. The store mutates these records on every append and rotation;
//! after a crash they are the single source of truth for replaying the
//! volume fleet.
//!
//! ## File format
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Header (8 bytes)                              │
//! │ - Magic bytes: "TMVM" (4 bytes)               │
//! │ - Version: 1 (2 bytes, LE)                    │
//! │ - Volume count (2 bytes, LE)                  │
//! ├───────────────────────────────────────────────┤
//! │ Record for volume 0 (16 bytes)                │
//! │ - capacity   (4 bytes, LE)                    │
//! │ - nblocks    (4 bytes, LE)                    │
//! │ - generation (4 bytes, LE)                    │
//! │ - crc32c of the 12 bytes above (4 bytes, LE)  │
//! ├───────────────────────────────────────────────┤
//! │ Record for volume 1 ...                       │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Records are rewritten in place; mutations are durable once `flush()`
//! returns. A record whose CRC does not match fails `open_existing`.

use bytes::{Buf, BufMut, BytesMut};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::info;

use crate::error::{Error, Result};

const META_MAGIC: [u8; 4] = *b"TMVM";
const META_VERSION: u16 = 1;
const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
struct VolumeRecord {
    capacity: u32,
    nblocks: u32,
    generation: u32,
}

impl VolumeRecord {
    fn encode(&self, buf: &mut impl BufMut) {
        let mut fields = [0u8; 12];
        fields[0..4].copy_from_slice(&self.capacity.to_le_bytes());
        fields[4..8].copy_from_slice(&self.nblocks.to_le_bytes());
        fields[8..12].copy_from_slice(&self.generation.to_le_bytes());
        buf.put_slice(&fields);
        buf.put_u32_le(crc32c::crc32c(&fields));
    }

    fn decode(buf: &mut impl Buf) -> Result<Self> {
        let mut fields = [0u8; 12];
        buf.copy_to_slice(&mut fields);
        let stored_crc = buf.get_u32_le();
        if stored_crc != crc32c::crc32c(&fields) {
            return Err(Error::Corrupt("meta-volume record CRC mismatch".to_string()));
        }
        Ok(Self {
            capacity: u32::from_le_bytes(fields[0..4].try_into().unwrap()),
            nblocks: u32::from_le_bytes(fields[4..8].try_into().unwrap()),
            generation: u32::from_le_bytes(fields[8..12].try_into().unwrap()),
        })
    }
}

pub struct MetaVolume {
    file: File,
    path: PathBuf,
    records: Vec<VolumeRecord>,
}

impl MetaVolume {
    /// Create a fresh meta-volume for a fleet of `capacities.len()`
    /// volumes, all empty, with generation `i` for volume `i`.
    pub async fn create_new<P: AsRef<Path>>(path: P, capacities: &[u32]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if capacities.is_empty() || capacities.len() > u16::MAX as usize {
            return Err(Error::Corrupt(format!(
                "unsupported volume count {}",
                capacities.len()
            )));
        }

        let records: Vec<VolumeRecord> = capacities
            .iter()
            .enumerate()
            .map(|(ix, &capacity)| VolumeRecord {
                capacity,
                nblocks: 0,
                generation: ix as u32,
            })
            .collect();

        let mut buf = BytesMut::with_capacity(HEADER_LEN + records.len() * RECORD_LEN);
        buf.put_slice(&META_MAGIC);
        buf.put_u16_le(META_VERSION);
        buf.put_u16_le(records.len() as u16);
        for record in &records {
            record.encode(&mut buf);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.sync_all().await?;

        info!(path = ?path, volumes = records.len(), "meta-volume created");

        Ok(Self { file, path, records })
    }

    /// Open and validate an existing meta-volume.
    pub async fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path).await?;
        let data = tokio::fs::read(&path).await?;

        if data.len() < HEADER_LEN {
            return Err(Error::Corrupt("meta-volume header truncated".to_string()));
        }
        let mut cursor = &data[..];
        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if magic != META_MAGIC {
            return Err(Error::Corrupt("meta-volume magic mismatch".to_string()));
        }
        let version = cursor.get_u16_le();
        if version != META_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported meta-volume version {}",
                version
            )));
        }
        let nvolumes = cursor.get_u16_le() as usize;
        if data.len() < HEADER_LEN + nvolumes * RECORD_LEN {
            return Err(Error::Corrupt("meta-volume records truncated".to_string()));
        }

        let mut records = Vec::with_capacity(nvolumes);
        for _ in 0..nvolumes {
            records.push(VolumeRecord::decode(&mut cursor)?);
        }

        info!(path = ?path, volumes = records.len(), "meta-volume opened");

        Ok(Self { file, path, records })
    }

    pub fn nvolumes(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, volix: u32) -> Result<&VolumeRecord> {
        self.records
            .get(volix as usize)
            .ok_or(Error::BadVolumeIndex(volix))
    }

    pub fn generation(&self, volix: u32) -> Result<u32> {
        Ok(self.record(volix)?.generation)
    }

    pub fn nblocks(&self, volix: u32) -> Result<u32> {
        Ok(self.record(volix)?.nblocks)
    }

    pub fn capacity(&self, volix: u32) -> Result<u32> {
        Ok(self.record(volix)?.capacity)
    }

    pub async fn set_generation(&mut self, volix: u32, generation: u32) -> Result<()> {
        self.record(volix)?;
        self.records[volix as usize].generation = generation;
        self.write_record(volix).await
    }

    pub async fn set_nblocks(&mut self, volix: u32, nblocks: u32) -> Result<()> {
        let record = self.record(volix)?;
        if nblocks > record.capacity {
            return Err(Error::Corrupt(format!(
                "nblocks {} exceeds capacity {} for volume {}",
                nblocks, record.capacity, volix
            )));
        }
        self.records[volix as usize].nblocks = nblocks;
        self.write_record(volix).await
    }

    async fn write_record(&mut self, volix: u32) -> Result<()> {
        let mut buf = BytesMut::with_capacity(RECORD_LEN);
        self.records[volix as usize].encode(&mut buf);
        let offset = (HEADER_LEN + volix as usize * RECORD_LEN) as u64;
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(&buf).await?;
        Ok(())
    }

    /// Make every preceding mutation durable.
    pub async fn flush(&mut self) -> Result<()> {
        self.file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tdm");
        {
            let meta = MetaVolume::create_new(&path, &[10, 20, 30]).await.unwrap();
            assert_eq!(meta.nvolumes(), 3);
            assert_eq!(meta.capacity(1).unwrap(), 20);
            assert_eq!(meta.nblocks(1).unwrap(), 0);
            assert_eq!(meta.generation(2).unwrap(), 2);
        }

        let meta = MetaVolume::open_existing(&path).await.unwrap();
        assert_eq!(meta.nvolumes(), 3);
        assert_eq!(meta.capacity(2).unwrap(), 30);
    }

    #[tokio::test]
    async fn test_mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tdm");
        {
            let mut meta = MetaVolume::create_new(&path, &[10, 10]).await.unwrap();
            meta.set_nblocks(0, 7).await.unwrap();
            meta.set_generation(1, 3).await.unwrap();
            meta.flush().await.unwrap();
        }

        let meta = MetaVolume::open_existing(&path).await.unwrap();
        assert_eq!(meta.nblocks(0).unwrap(), 7);
        assert_eq!(meta.generation(1).unwrap(), 3);
        assert_eq!(meta.nblocks(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nblocks_bounded_by_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = MetaVolume::create_new(dir.path().join("meta.tdm"), &[4])
            .await
            .unwrap();
        assert!(meta.set_nblocks(0, 4).await.is_ok());
        assert!(meta.set_nblocks(0, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_volume_index() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaVolume::create_new(dir.path().join("meta.tdm"), &[4])
            .await
            .unwrap();
        assert!(matches!(meta.nblocks(1), Err(Error::BadVolumeIndex(1))));
    }

    #[tokio::test]
    async fn test_corrupt_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tdm");
        {
            let mut meta = MetaVolume::create_new(&path, &[4, 4]).await.unwrap();
            meta.flush().await.unwrap();
        }
        // Flip a byte inside the second record's fields.
        let mut data = std::fs::read(&path).unwrap();
        data[HEADER_LEN + RECORD_LEN + 2] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        assert!(matches!(
            MetaVolume::open_existing(&path).await,
            Err(Error::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_magic_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tdm");
        std::fs::write(&path, b"NOPE\x01\x00\x01\x00").unwrap();
        assert!(matches!(
            MetaVolume::open_existing(&path).await,
            Err(Error::Corrupt(_))
        ));
    }
}
