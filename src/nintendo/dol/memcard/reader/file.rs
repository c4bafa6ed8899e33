use crate::nintendo::dol::memcard::card::MemoryCard;
use crate::nintendo::dol::memcard::constants::{BLOCK_SIZE, DIR_ENTRY_SIZE};
use crate::nintendo::dol::memcard::error::MemcardResult;
use crate::nintendo::dol::memcard::models::DirectoryEntry;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Read-only stream over a save file in GCI layout: the 64-byte directory
/// entry followed by every block of the file in chain order.
///
/// Each reader owns its cursor, so any number of them can read the same
/// card at once.
#[derive(Debug, Clone)]
pub struct FileReader {
    card: Arc<MemoryCard>,
    header: [u8; DIR_ENTRY_SIZE],
    chain: Vec<usize>,
    position: u64,
}

impl FileReader {
    pub(crate) fn new(card: Arc<MemoryCard>, entry: &DirectoryEntry) -> MemcardResult<Self> {
        let chain = card.chain(entry.first_block)?;
        let header = entry.to_bytes()?;

        Ok(Self {
            card,
            header,
            chain,
            position: 0,
        })
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        (DIR_ENTRY_SIZE + self.chain.len() * BLOCK_SIZE) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable block indices backing the file, in chain order.
    pub fn blocks(&self) -> &[usize] {
        &self.chain
    }

    fn segment_at(&self, position: usize) -> &[u8] {
        if position < DIR_ENTRY_SIZE {
            return &self.header[position..];
        }

        let offset = position - DIR_ENTRY_SIZE;
        let block = &self.card.blocks[self.chain[offset / BLOCK_SIZE]];
        &block[offset % BLOCK_SIZE..]
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.len() || buf.is_empty() {
            return Ok(0);
        }

        let segment = self.segment_at(self.position as usize);
        let n = segment.len().min(buf.len());
        buf[..n].copy_from_slice(&segment[..n]);
        self.position += n as u64;

        Ok(n)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
