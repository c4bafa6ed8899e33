use crate::nintendo::dol::memcard::constants::{
    BLOCK_SIZE, CHAIN_END, RESERVED_BLOCKS, RESERVED_FILL, SERIAL_LENGTH,
};
use crate::nintendo::dol::memcard::error::{CardRegion, MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::models::header::HEADER_SIZE;
use crate::nintendo::dol::memcard::models::{
    BlockMap, COPIES, CardCopy, CardSize, ChecksummedRecord, Directory, Encoding, Header,
};
use binrw::{BinRead, Endian};
use log::debug;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// A single 8 KiB storage block.
pub type Block = [u8; BLOCK_SIZE];

/// A complete memory card image: header, both directory and block map copies
/// and the usable blocks that follow them.
///
/// Usable blocks are indexed from zero, i.e. raw block index minus
/// [`RESERVED_BLOCKS`].
#[derive(Clone)]
pub struct MemoryCard {
    pub header: Header,
    pub directories: [Directory; COPIES],
    pub block_maps: [BlockMap; COPIES],
    pub blocks: Vec<Block>,
}

impl MemoryCard {
    /// Formats a new, empty card.
    pub fn new_blank(
        flash_id: &[u8; SERIAL_LENGTH],
        format_time: u64,
        card_size: CardSize,
        encoding: Encoding,
    ) -> MemcardResult<Self> {
        let header = Header::new(flash_id, format_time, card_size, encoding);
        let free_blocks = card_size.usable_blocks();

        // Counters of 1 and 0 make the master copy the active one
        let mut card = Self {
            header,
            directories: [Directory::new(1), Directory::new(0)],
            block_maps: [
                BlockMap::new(1, free_blocks as u16),
                BlockMap::new(0, free_blocks as u16),
            ],
            blocks: vec![[RESERVED_FILL; BLOCK_SIZE]; free_blocks],
        };

        card.update_checksums()?;

        debug!(
            "Formatted blank {} block card with {:?} encoding",
            free_blocks, encoding
        );

        Ok(card)
    }

    /// Decodes and validates an image. The source must end exactly after the last block.
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> MemcardResult<Self> {
        let header = Header::read_options(reader, Endian::Big, ())?;
        header.card_size()?;
        header.encoding()?;

        let directories = [
            Directory::read_options(reader, Endian::Big, ())?,
            Directory::read_options(reader, Endian::Big, ())?,
        ];
        let block_maps = [
            BlockMap::read_options(reader, Endian::Big, ())?,
            BlockMap::read_options(reader, Endian::Big, ())?,
        ];

        let mut blocks = vec![[0u8; BLOCK_SIZE]; header.usable_blocks()];
        for block in blocks.iter_mut() {
            reader.read_exact(block)?;
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? > 0 {
            return Err(MemcardError::TrailingData);
        }

        let card = Self {
            header,
            directories,
            block_maps,
            blocks,
        };

        card.validate()?;

        debug!(
            "Decoded {} byte card holding {} files",
            card.size(),
            card.count()
        );

        Ok(card)
    }

    pub fn from_bytes(bytes: &[u8]) -> MemcardResult<Self> {
        Self::from_reader(&mut Cursor::new(bytes))
    }

    /// Serializes the header, both directories, both block maps and the blocks, in that order.
    pub fn to_bytes(&self) -> MemcardResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.size());

        bytes.extend_from_slice(&self.header.to_bytes()?);
        for directory in &self.directories {
            bytes.extend_from_slice(&directory.to_bytes()?);
        }
        for block_map in &self.block_maps {
            bytes.extend_from_slice(&block_map.to_bytes()?);
        }
        for block in &self.blocks {
            bytes.extend_from_slice(block);
        }

        Ok(bytes)
    }

    /// Writes the serialized image, failing if it does not match the declared size.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> MemcardResult<usize> {
        let bytes = self.to_bytes()?;
        if bytes.len() != self.size() {
            return Err(MemcardError::InvalidLength);
        }

        writer.write_all(&bytes)?;
        writer.flush()?;

        Ok(bytes.len())
    }

    /// Whether the first `size` bytes of `reader` look like a memory card image.
    pub fn detect<R: Read + Seek>(reader: &mut R, size: u64) -> MemcardResult<bool> {
        if size < HEADER_SIZE as u64 {
            return Ok(false);
        }

        reader.seek(SeekFrom::Start(0))?;
        let header = Header::read_options(reader, Endian::Big, ())?;

        Ok(header.encoding().is_ok() && size == header.size() as u64)
    }

    pub fn size(&self) -> usize {
        self.header.size()
    }

    pub fn active_directory_copy(&self) -> CardCopy {
        CardCopy::active(
            self.directories[CardCopy::Master.index()].update_counter,
            self.directories[CardCopy::Backup.index()].update_counter,
        )
    }

    pub fn active_block_map_copy(&self) -> CardCopy {
        CardCopy::active(
            self.block_maps[CardCopy::Master.index()].update_counter,
            self.block_maps[CardCopy::Backup.index()].update_counter,
        )
    }

    pub fn active_directory(&self) -> &Directory {
        &self.directories[self.active_directory_copy().index()]
    }

    pub fn active_directory_mut(&mut self) -> &mut Directory {
        let copy = self.active_directory_copy();
        &mut self.directories[copy.index()]
    }

    pub fn active_block_map(&self) -> &BlockMap {
        &self.block_maps[self.active_block_map_copy().index()]
    }

    pub fn active_block_map_mut(&mut self) -> &mut BlockMap {
        let copy = self.active_block_map_copy();
        &mut self.block_maps[copy.index()]
    }

    /// Number of files in the active directory.
    pub fn count(&self) -> usize {
        self.active_directory().count()
    }

    pub fn serial_numbers(&self) -> MemcardResult<(u32, u32)> {
        self.header.serial_numbers()
    }

    /// Recomputes the checksums of the header and of every directory and block map copy.
    pub fn update_checksums(&mut self) -> MemcardResult<()> {
        self.header.update_checksums()?;
        for directory in self.directories.iter_mut() {
            directory.update_checksums()?;
        }
        for block_map in self.block_maps.iter_mut() {
            block_map.update_checksums()?;
        }
        Ok(())
    }

    /// Checks every stored checksum and the update counters of both redundant pairs.
    pub fn validate(&self) -> MemcardResult<()> {
        if !self.header.has_valid_checksums()? {
            return Err(MemcardError::BadChecksum(CardRegion::Header));
        }

        for copy in CardCopy::ALL {
            if !self.directories[copy.index()].has_valid_checksums()? {
                return Err(MemcardError::BadChecksum(CardRegion::Directory(copy)));
            }

            if !self.block_maps[copy.index()].has_valid_checksums()? {
                return Err(MemcardError::BadChecksum(CardRegion::BlockMap(copy)));
            }
        }

        let [master, backup] = &self.directories;
        if !CardCopy::counters_consistent(master.update_counter, backup.update_counter) {
            return Err(MemcardError::InvalidDirectoryCounters);
        }

        let [master, backup] = &self.block_maps;
        if !CardCopy::counters_consistent(master.update_counter, backup.update_counter) {
            return Err(MemcardError::InvalidBlockMapCounters);
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Follows the active block map from `first_block` (a raw index) and
    /// returns the usable block indices of the file in chain order.
    pub fn chain(&self, first_block: u16) -> MemcardResult<Vec<usize>> {
        let block_map = self.active_block_map();
        let mut chain = Vec::new();
        let mut raw = first_block;

        loop {
            let index = (raw as usize)
                .checked_sub(RESERVED_BLOCKS)
                .filter(|&index| index < self.blocks.len())
                .ok_or(MemcardError::InvalidBlockChain(raw))?;

            // A chain longer than the card can only be a loop
            if chain.len() == self.blocks.len() {
                return Err(MemcardError::InvalidBlockChain(raw));
            }

            chain.push(index);

            match block_map.blocks[index] {
                CHAIN_END => break,
                next => raw = next,
            }
        }

        Ok(chain)
    }
}

impl fmt::Debug for MemoryCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCard")
            .field("header", &self.header)
            .field("active_directory", &self.active_directory_copy())
            .field("active_block_map", &self.active_block_map_copy())
            .field("files", &self.count())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nintendo::dol::memcard::constants::HEADER_UNFORMATTED_COUNTER;

    fn blank(card_size: CardSize) -> MemoryCard {
        MemoryCard::new_blank(&[0; SERIAL_LENGTH], 0, card_size, Encoding::Ansi).unwrap()
    }

    #[test]
    fn test_blank_card_is_valid_for_every_size_and_encoding() {
        for card_size in CardSize::ALL {
            for encoding in [Encoding::Ansi, Encoding::ShiftJis] {
                let card =
                    MemoryCard::new_blank(&[0x5A; SERIAL_LENGTH], 1, card_size, encoding).unwrap();
                card.validate().unwrap();
                assert_eq!(card.size(), card_size.size());
                assert_eq!(card.blocks.len(), card_size.usable_blocks());
            }
        }
    }

    #[test]
    fn test_blank_59_block_card() {
        let card = blank(CardSize::MemoryCard59);
        let bytes = card.to_bytes().unwrap();

        assert_eq!(bytes.len(), 524288);
        assert_eq!(card.count(), 0);
        assert_eq!(card.header.update_counter, HEADER_UNFORMATTED_COUNTER);
        assert_eq!(card.active_directory_copy(), CardCopy::Master);
        assert_eq!(card.active_block_map_copy(), CardCopy::Master);
        assert_eq!(card.active_block_map().free_blocks, 59);
        assert_eq!(card.active_block_map().last_allocated_block, 4);
        assert!(bytes[5 * BLOCK_SIZE..].iter().all(|&b| b == 0xFF));

        let decoded = MemoryCard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.count(), 0);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_unmarshal_rejects_trailing_data() {
        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes.push(0);

        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::TrailingData)
        ));
    }

    #[test]
    fn test_unmarshal_rejects_truncated_image() {
        let bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        assert!(MemoryCard::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_unmarshal_rejects_bad_capacity() {
        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes[0x22..0x24].copy_from_slice(&[0x00, 0x05]);

        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::InvalidCapacity(5))
        ));
    }

    #[test]
    fn test_unmarshal_rejects_bad_encoding() {
        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes[0x24..0x26].copy_from_slice(&[0x00, 0x02]);

        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::InvalidEncoding(2))
        ));
    }

    #[test]
    fn test_unmarshal_names_bad_checksum() {
        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes[0x10] ^= 0x01;
        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::BadChecksum(CardRegion::Header))
        ));

        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes[2 * BLOCK_SIZE] = 0x47;
        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::BadChecksum(CardRegion::Directory(
                CardCopy::Backup
            )))
        ));

        let mut bytes = blank(CardSize::MemoryCard59).to_bytes().unwrap();
        bytes[3 * BLOCK_SIZE + 6] ^= 0x01;
        assert!(matches!(
            MemoryCard::from_bytes(&bytes),
            Err(MemcardError::BadChecksum(CardRegion::BlockMap(
                CardCopy::Master
            )))
        ));
    }

    #[test]
    fn test_validate_rejects_counter_gap() {
        let mut card = blank(CardSize::MemoryCard59);
        card.directories[0].update_counter = 3;
        card.update_checksums().unwrap();
        assert!(matches!(
            card.validate(),
            Err(MemcardError::InvalidDirectoryCounters)
        ));

        let mut card = blank(CardSize::MemoryCard59);
        card.block_maps[1].update_counter = 1;
        card.update_checksums().unwrap();
        assert!(matches!(
            card.validate(),
            Err(MemcardError::InvalidBlockMapCounters)
        ));
    }

    #[test]
    fn test_active_copy_follows_counters() {
        let mut card = blank(CardSize::MemoryCard59);
        card.directories[1].update_counter = 2;
        assert_eq!(card.active_directory_copy(), CardCopy::Backup);

        card.block_maps[1].update_counter = 2;
        assert_eq!(card.active_block_map_copy(), CardCopy::Backup);
    }

    #[test]
    fn test_chain_walk() {
        let mut card = blank(CardSize::MemoryCard59);
        {
            let map = card.active_block_map_mut();
            map.blocks[0] = 7;
            map.blocks[2] = 6;
            map.blocks[1] = CHAIN_END;
        }

        assert_eq!(card.chain(5).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn test_chain_rejects_out_of_range_and_loops() {
        let mut card = blank(CardSize::MemoryCard59);
        assert!(matches!(
            card.chain(2),
            Err(MemcardError::InvalidBlockChain(2))
        ));

        card.active_block_map_mut().blocks[0] = 200;
        assert!(matches!(
            card.chain(5),
            Err(MemcardError::InvalidBlockChain(200))
        ));

        card.active_block_map_mut().blocks[0] = 5;
        assert!(matches!(
            card.chain(5),
            Err(MemcardError::InvalidBlockChain(5))
        ));
    }

    #[test]
    fn test_detect() {
        let bytes = blank(CardSize::MemoryCard123).to_bytes().unwrap();
        let mut cursor = Cursor::new(&bytes);

        assert!(MemoryCard::detect(&mut cursor, bytes.len() as u64).unwrap());
        assert!(!MemoryCard::detect(&mut cursor, bytes.len() as u64 - 1).unwrap());
        assert!(!MemoryCard::detect(&mut cursor, 16).unwrap());
    }

    #[test]
    fn test_write_to() {
        let card = blank(CardSize::MemoryCard59);
        let mut out = Vec::new();
        assert_eq!(card.write_to(&mut out).unwrap(), 524288);
        assert_eq!(out, card.to_bytes().unwrap());
    }
}
