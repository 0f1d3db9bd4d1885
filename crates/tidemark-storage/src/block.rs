//! Blocks and logical addresses.
//!
//! A block is one fixed-size page plus the logical address it was read
//! from or appended at. Logical addresses pack a volume generation in the
//! high half and the block's position inside the volume in the low half,
//! so a stale address (one whose generation has been rotated away) is
//! detectable without touching the volume file.

use tidemark_core::{ChunkWriter, Error as CodecError};

/// Size of one storage page. Volume files are a whole number of these.
pub const BLOCK_SIZE: usize = 4096;

/// `(generation << 32) | block_index`.
pub type LogicAddr = u64;

/// Sentinel for a block that has not been assigned an address.
pub const EMPTY_ADDR: LogicAddr = LogicAddr::MAX;

pub fn make_logic(generation: u32, block_index: u32) -> LogicAddr {
    ((generation as u64) << 32) | block_index as u64
}

pub fn generation_of(addr: LogicAddr) -> u32 {
    (addr >> 32) as u32
}

pub fn block_index_of(addr: LogicAddr) -> u32 {
    addr as u32
}

/// One owned page and its logical address.
#[derive(Debug, Clone)]
pub struct Block {
    addr: LogicAddr,
    data: Vec<u8>,
}

impl Block {
    pub fn new(addr: LogicAddr, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), BLOCK_SIZE);
        Self { addr, data }
    }

    /// A zero-filled page with no address.
    pub fn zeroed() -> Self {
        Self {
            addr: EMPTY_ADDR,
            data: vec![0; BLOCK_SIZE],
        }
    }

    pub fn addr(&self) -> LogicAddr {
        self.addr
    }

    pub fn set_addr(&mut self, addr: LogicAddr) {
        self.addr = addr;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// [`ChunkWriter`] over a single page, so a chunk can be encoded straight
/// into a block and handed to a store.
///
/// ```ignore
/// let mut writer = BlockWriter::new();
/// let summary = encode_chunk(&mut writer, &chunk)?;
/// let (block, used) = writer.into_block();
/// let addr = store.append_block(block.data()).await?;
/// ```
pub struct BlockWriter {
    block: Block,
    written: usize,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self {
            block: Block::zeroed(),
            written: 0,
        }
    }

    /// The finished page and how many of its bytes carry encoded data.
    pub fn into_block(self) -> (Block, usize) {
        (self.block, self.written)
    }
}

impl Default for BlockWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkWriter for BlockWriter {
    fn allocate(&mut self) -> tidemark_core::Result<&mut [u8]> {
        Ok(self.block.data_mut())
    }

    fn commit(&mut self, bytes_written: usize) -> tidemark_core::Result<()> {
        if bytes_written > BLOCK_SIZE {
            return Err(CodecError::OutOfBounds("chunk larger than block"));
        }
        self.written = bytes_written;
        Ok(())
    }
}
