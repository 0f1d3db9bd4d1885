pub mod chunk;
pub mod error;
pub mod framed;
pub mod stream;
pub mod transform;
pub mod varint;

pub use chunk::{
    convert_from_chunk_order, convert_from_time_order, decode_chunk, encode_chunk, ChunkSummary,
    ChunkWriter, UncompressedChunk,
};
pub use error::{Error, Result};
