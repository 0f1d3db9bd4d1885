//! Error types for the codec crate.
//!
//! Every stream and chunk operation returns `Result<T>` aliased to
//! `Result<T, Error>` so failures propagate with `?`.
//!
//! - `OutOfBounds`: a read or write would run past the buffer the stream
//!   was given. Writers never leave a partial value behind.
//! - `BadData`: the bytes decoded fine mechanically but violate the
//!   format (zero-length run, length code out of range, bad ctrl bits).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("stream out of bounds: {0}")]
    OutOfBounds(&'static str),

    #[error("bad data: {0}")]
    BadData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
