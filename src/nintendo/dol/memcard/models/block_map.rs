use crate::nintendo::dol::memcard::constants::{
    BLOCK_MAP_CHECKSUM_OFFSET, BLOCK_MAP_ENTRIES, BLOCK_SIZE, RESERVED_BLOCKS,
};
use crate::nintendo::dol::memcard::models::checksums::{Checksums, ChecksummedRecord};
use binrw::{BinRead, BinWrite};
use std::ops::Range;

/// Block allocation map. Each slot links a usable block to the raw index of
/// the next block in its file, or holds [`CHAIN_END`] for the last one.
///
/// [`CHAIN_END`]: crate::nintendo::dol::memcard::constants::CHAIN_END
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct BlockMap {
    pub checksum: Checksums,

    pub update_counter: u16,

    pub free_blocks: u16,

    /// Raw index of the most recently allocated block
    pub last_allocated_block: u16,

    pub blocks: [u16; BLOCK_MAP_ENTRIES],
}

impl BlockMap {
    pub fn new(update_counter: u16, free_blocks: u16) -> Self {
        Self {
            checksum: Checksums::default(),
            update_counter,
            free_blocks,
            last_allocated_block: (RESERVED_BLOCKS - 1) as u16,
            blocks: [0; BLOCK_MAP_ENTRIES],
        }
    }
}

impl ChecksummedRecord for BlockMap {
    const CHECKSUM_SPAN: Range<usize> = BLOCK_MAP_CHECKSUM_OFFSET..BLOCK_SIZE;

    fn checksums(&self) -> &Checksums {
        &self.checksum
    }

    fn checksums_mut(&mut self) -> &mut Checksums {
        &mut self.checksum
    }
}
