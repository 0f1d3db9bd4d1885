//! The rotating block store.
//!
//! `FileBlockStore` turns a fleet of fixed-size volumes into one
//! append-only, block-addressed log that overwrites itself oldest-first:
//!
//! ```text
//! append ──▶ volume[current] ──full──▶ advance to next volume
//!                                          │
//!                             next volume already used?
//!                                          │ yes
//!                          generation += N, nblocks = 0, reset
//!                          (its previous contents are discarded)
//! ```
//!
//! ## Generations
//!
//! Every block address packs `(generation, block index)`. Generations
//! start at the volume's position in the fleet and grow by the fleet size
//! `N` on each reuse, so `generation % N` always names the physical
//! volume and a single meta-volume comparison tells whether an address is
//! still live. Rotation makes the store a circular log: after the fleet
//! wraps, the oldest generation of a volume simply stops existing.
//!
//! ## Crash safety
//!
//! The meta-volume tracks `(capacity, nblocks, generation)` per volume
//! and is updated on every append and rotation. Opening a store replays
//! those records; blocks past the recorded fill are unreachable, which is
//! the correct outcome for a torn final append. If a meta update itself
//! fails mid-append or mid-rotation the pair has diverged and cannot be
//! reconciled, so the store halts all further writes.
//!
//! All operations are serialized by one mutex; address assignment order
//! matches lock acquisition order. Reads can be served from an optional
//! [`BlockCache`] once the address has been validated against the
//! meta-volume.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::block::{block_index_of, generation_of, make_logic, Block, LogicAddr, BLOCK_SIZE};
use crate::cache::BlockCache;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::meta::MetaVolume;
use crate::volume::Volume;

/// Aggregate fill counters for a store (or a single volume).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Bytes per block.
    pub block_size: u32,
    /// Total capacity in blocks.
    pub capacity: u64,
    /// Blocks currently addressable.
    pub nblocks: u64,
}

/// Block-addressed storage: the file-backed store and the in-memory test
/// double implement the same contract.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Append one `BLOCK_SIZE` page, returning its logical address.
    async fn append_block(&self, data: &[u8]) -> Result<LogicAddr>;

    /// Read the page at `addr`. Stale or never-written addresses fail
    /// with [`Error::UnknownAddr`].
    async fn read_block(&self, addr: LogicAddr) -> Result<Arc<Block>>;

    /// Whether `addr` is currently readable. All errors collapse to
    /// `false`.
    async fn exists(&self, addr: LogicAddr) -> bool;

    /// Make every appended block and meta mutation durable.
    async fn flush(&self) -> Result<()>;

    async fn stats(&self) -> StoreStats;

    /// Checksum for block payloads (crc32c).
    fn checksum(&self, data: &[u8]) -> u32;
}

struct StoreState {
    meta: MetaVolume,
    volumes: Vec<Volume>,
    current_volume: u32,
    current_gen: u32,
    /// Advisory per-volume counters of unflushed writes.
    dirty: Vec<u32>,
    halted: bool,
}

pub struct FileBlockStore {
    state: Mutex<StoreState>,
    cache: Option<BlockCache>,
}

impl FileBlockStore {
    /// Provision the volume files and meta-volume described by `config`.
    pub async fn create(config: &StoreConfig) -> Result<()> {
        let mut capacities = Vec::with_capacity(config.volumes.len());
        for spec in &config.volumes {
            Volume::create_new(&spec.path, spec.capacity).await?;
            capacities.push(spec.capacity);
        }
        MetaVolume::create_new(&config.meta_path, &capacities).await?;
        info!(
            meta = ?config.meta_path,
            volumes = config.volumes.len(),
            "block store created"
        );
        Ok(())
    }

    /// Open a previously created store, replaying fill levels from the
    /// meta-volume.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let meta = MetaVolume::open_existing(&config.meta_path).await?;
        if meta.nvolumes() as usize != config.volumes.len() {
            return Err(Error::Corrupt(format!(
                "meta-volume tracks {} volumes, config names {}",
                meta.nvolumes(),
                config.volumes.len()
            )));
        }

        let mut volumes = Vec::with_capacity(config.volumes.len());
        for (ix, spec) in config.volumes.iter().enumerate() {
            let nblocks = meta.nblocks(ix as u32)?;
            let volume = Volume::open_existing(&spec.path, nblocks).await?;
            if volume.capacity() != meta.capacity(ix as u32)? {
                return Err(Error::Corrupt(format!(
                    "volume {} capacity {} disagrees with meta-volume {}",
                    spec.path.display(),
                    volume.capacity(),
                    meta.capacity(ix as u32)?
                )));
            }
            volumes.push(volume);
        }

        // The current volume is the first one with free space; if the
        // whole fleet is full the next append rotates from volume 0.
        let mut current_volume = 0;
        let mut current_gen = meta.generation(0)?;
        for ix in 0..volumes.len() as u32 {
            if meta.nblocks(ix)? < meta.capacity(ix)? {
                current_volume = ix;
                current_gen = meta.generation(ix)?;
                break;
            }
        }

        info!(
            volumes = volumes.len(),
            current_volume, current_gen, "block store opened"
        );

        let dirty = vec![0; volumes.len()];
        Ok(Self {
            state: Mutex::new(StoreState {
                meta,
                volumes,
                current_volume,
                current_gen,
                dirty,
                halted: false,
            }),
            cache: config.cache_bits.map(BlockCache::new),
        })
    }

    /// Select the next volume, discarding its previous generation if it
    /// was ever written.
    async fn advance_volume(state: &mut StoreState) -> Result<()> {
        let nvolumes = state.volumes.len() as u32;
        state.current_volume = (state.current_volume + 1) % nvolumes;
        let volix = state.current_volume;
        state.current_gen = state.meta.generation(volix)?;

        let nblocks = state.meta.nblocks(volix)?;
        if nblocks != 0 {
            // Reuse: bump the generation by the fleet size, which keeps
            // `generation % nvolumes == volix`, and rewind the volume.
            state.current_gen += nvolumes;
            let generation = state.current_gen;
            if let Err(e) = state.meta.set_generation(volix, generation).await {
                state.halted = true;
                error!(volume = volix, error = %e, "failed to set generation, halting");
                return Err(Error::Halted(e.to_string()));
            }
            if let Err(e) = state.meta.set_nblocks(volix, 0).await {
                state.halted = true;
                error!(volume = volix, error = %e, "failed to reset nblocks, halting");
                return Err(Error::Halted(e.to_string()));
            }
            state.volumes[volix as usize].reset();
            state.dirty[volix as usize] += 1;
            info!(
                volume = volix,
                generation, "rotated volume, previous generation discarded"
            );
        }
        Ok(())
    }

    /// Validate `addr` against the meta-volume. Returns the owning volume
    /// index.
    fn validate_addr(state: &StoreState, addr: LogicAddr) -> Result<u32> {
        let gen = generation_of(addr);
        let index = block_index_of(addr);
        let volix = gen % state.volumes.len() as u32;
        let live_gen = state.meta.generation(volix).map_err(|_| Error::UnknownAddr(addr))?;
        let nblocks = state.meta.nblocks(volix).map_err(|_| Error::UnknownAddr(addr))?;
        if live_gen != gen || index >= nblocks {
            return Err(Error::UnknownAddr(addr));
        }
        Ok(volix)
    }

    /// Per-volume fill counters keyed by volume path.
    pub async fn volume_stats(&self) -> HashMap<String, StoreStats> {
        let state = self.state.lock().await;
        let mut result = HashMap::new();
        for (ix, volume) in state.volumes.iter().enumerate() {
            let stats = StoreStats {
                block_size: BLOCK_SIZE as u32,
                capacity: state.meta.capacity(ix as u32).unwrap_or(0) as u64,
                nblocks: state.meta.nblocks(ix as u32).unwrap_or(0) as u64,
            };
            result.insert(volume.path().display().to_string(), stats);
        }
        result
    }
}

#[async_trait]
impl BlockStore for FileBlockStore {
    async fn append_block(&self, data: &[u8]) -> Result<LogicAddr> {
        if data.len() != BLOCK_SIZE {
            return Err(Error::BadBlockSize {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        let mut state = self.state.lock().await;
        if state.halted {
            return Err(Error::Halted("earlier meta-volume failure".to_string()));
        }

        let volix = state.current_volume as usize;
        let block_index = match state.volumes[volix].append_block(data).await {
            Ok(index) => index,
            Err(Error::VolumeOverflow) => {
                Self::advance_volume(&mut state).await?;
                let volix = state.current_volume as usize;
                state.volumes[volix].append_block(data).await?
            }
            Err(e) => return Err(e),
        };

        let volix = state.current_volume;
        if let Err(e) = state.meta.set_nblocks(volix, block_index + 1).await {
            // The volume and its record have diverged; nothing written
            // from here on could be replayed correctly.
            state.halted = true;
            error!(volume = volix, error = %e, "failed to record append, halting");
            return Err(Error::Halted(e.to_string()));
        }
        state.dirty[volix as usize] += 1;

        Ok(make_logic(state.current_gen, block_index))
    }

    async fn read_block(&self, addr: LogicAddr) -> Result<Arc<Block>> {
        let mut state = self.state.lock().await;
        let volix = Self::validate_addr(&state, addr)?;

        if let Some(cache) = &self.cache {
            if let Some(block) = cache.lookup(addr) {
                return Ok(block);
            }
        }

        let mut data = vec![0u8; BLOCK_SIZE];
        state.volumes[volix as usize]
            .read_block(block_index_of(addr), &mut data)
            .await?;
        let block = Arc::new(Block::new(addr, data));
        if let Some(cache) = &self.cache {
            cache.insert(&block);
        }
        Ok(block)
    }

    async fn exists(&self, addr: LogicAddr) -> bool {
        let state = self.state.lock().await;
        Self::validate_addr(&state, addr).is_ok()
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        // Dirty counters are advisory; flushing everything keeps the
        // durability contract independent of them.
        for volume in &mut state.volumes {
            volume.flush().await?;
        }
        for counter in &mut state.dirty {
            *counter = 0;
        }
        state.meta.flush().await?;
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        let state = self.state.lock().await;
        let mut stats = StoreStats {
            block_size: BLOCK_SIZE as u32,
            capacity: 0,
            nblocks: 0,
        };
        for ix in 0..state.meta.nvolumes() {
            stats.capacity += state.meta.capacity(ix).unwrap_or(0) as u64;
            stats.nblocks += state.meta.nblocks(ix).unwrap_or(0) as u64;
        }
        stats
    }

    fn checksum(&self, data: &[u8]) -> u32 {
        crc32c::crc32c(data)
    }
}
