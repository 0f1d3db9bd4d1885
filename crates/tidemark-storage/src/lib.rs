//! Tidemark Storage Layer
//!
//! This crate implements the lowest storage layer of tidemark: a
//! block-addressed, self-overwriting log built from a fixed fleet of
//! pre-sized volume files, plus an in-memory double and a read cache.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐
//! │  chunk codec         │  (tidemark-core)
//! │  encode_chunk        │
//! └─────────┬────────────┘
//!           │ one 4096-byte page (via BlockWriter)
//!           ▼
//! ┌──────────────────────┐     ┌───────────────────┐
//! │  FileBlockStore      │────▶│ BlockCache        │
//! │  - append / read     │     │ 2^bits weak slots │
//! │  - exists / flush    │     └───────────────────┘
//! └─────────┬────────────┘
//!           │
//!     ┌─────┴───────┬─────────────┐
//!     ▼             ▼             ▼
//! ┌────────┐   ┌────────┐   ┌────────────┐
//! │ vol 0  │   │ vol 1  │   │ meta-volume │
//! │ N×4096 │   │ N×4096 │   │ per-volume  │
//! └────────┘   └────────┘   │ gen/fill    │
//!                           └────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### FileBlockStore
//! Appends go to the current volume until it overflows, then rotate to
//! the next one; a reused volume gets a fresh generation and its old
//! contents become unreachable. Addresses pack `(generation, index)`, so
//! staleness is one meta-volume comparison away from any address.
//!
//! ### MemStore
//! The same [`BlockStore`] contract without files, generations, or
//! rotation. Dense addresses above a non-zero base plus a `remove`
//! watermark make it the test double for everything above the store.
//!
//! ### BlockCache
//! A lossy direct-mapped cache of weak block references with randomized
//! two-choice eviction. Because blocks are immutable once appended, a
//! cache hit can never be stale within a generation.
//!
//! ## Durability
//!
//! The meta-volume records `(capacity, nblocks, generation)` per volume
//! and is rewritten on every append and rotation; `flush()` fsyncs every
//! volume and then the meta-volume. If a meta mutation fails mid-write
//! the volume and its record have diverged — the store halts further
//! writes rather than produce addresses it could not replay.

pub mod block;
pub mod blockstore;
pub mod cache;
pub mod config;
pub mod error;
pub mod memstore;
pub mod meta;
pub mod volume;

pub use block::{
    block_index_of, generation_of, make_logic, Block, BlockWriter, LogicAddr, BLOCK_SIZE,
    EMPTY_ADDR,
};
pub use blockstore::{BlockStore, FileBlockStore, StoreStats};
pub use cache::{BlockCache, Probe};
pub use config::{StoreConfig, VolumeSpec};
pub use error::{Error, Result};
pub use memstore::{MemStore, MEMSTORE_BASE};
pub use meta::MetaVolume;
pub use volume::Volume;
