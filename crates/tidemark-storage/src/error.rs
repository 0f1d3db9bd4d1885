//! Storage Error Types
//!
//! All storage operations return `Result<T>` aliased to
//! `Result<T, Error>` so errors propagate cleanly with `?`.
//!
//! The variants callers act on:
//! - `UnknownAddr`: the logical address is malformed, was never written,
//!   or its generation has been rotated away.
//! - `Halted`: a meta-volume mutation failed mid-append or mid-rotation.
//!   The on-disk invariants can no longer be restored, so the store
//!   refuses every further write.
//! - `VolumeOverflow` is internal: appends catch it and rotate to the
//!   next volume; it only surfaces if the retry fails too.

use crate::block::LogicAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown or stale block address: {0:#018x}")]
    UnknownAddr(LogicAddr),

    #[error("volume is full")]
    VolumeOverflow,

    #[error("volume index {0} out of range")]
    BadVolumeIndex(u32),

    #[error("block payload is {actual} bytes, expected {expected}")]
    BadBlockSize { expected: usize, actual: usize },

    #[error("corrupted volume set: {0}")]
    Corrupt(String),

    #[error("block store halted: {0}")]
    Halted(String),

    #[error("codec error: {0}")]
    Codec(#[from] tidemark_core::Error),
}
