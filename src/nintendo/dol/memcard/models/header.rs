use crate::nintendo::dol::memcard::constants::{
    BLOCK_SIZE, HEADER_CHECKSUM_SPAN, HEADER_RESERVED_1_SIZE, HEADER_RESERVED_2_SIZE,
    HEADER_RESERVED_3_SIZE, HEADER_SERIAL_WORDS_SPAN, HEADER_UNFORMATTED_COUNTER,
    RESERVED_BLOCKS, RESERVED_FILL, SERIAL_LENGTH,
};
use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::models::checksums::{Checksums, ChecksummedRecord};
use crate::nintendo::dol::memcard::serial::{compute_serial, extract_flash_id};
use binrw::binrw;
use byteorder::{BigEndian, ByteOrder};
use std::ops::Range;

/// Supported memory card capacities, stored as megabits in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CardSize {
    MemoryCard59 = 4,
    MemoryCard123 = 8,
    MemoryCard251 = 16,
    MemoryCard507 = 32,
    MemoryCard1019 = 64,
    MemoryCard2043 = 128,
}

impl CardSize {
    pub const ALL: [CardSize; 6] = [
        CardSize::MemoryCard59,
        CardSize::MemoryCard123,
        CardSize::MemoryCard251,
        CardSize::MemoryCard507,
        CardSize::MemoryCard1019,
        CardSize::MemoryCard2043,
    ];

    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Total image size in bytes.
    pub fn size(&self) -> usize {
        (self.code() as usize) << 17
    }

    /// Total number of blocks, including the reserved system blocks.
    pub fn blocks(&self) -> usize {
        (self.code() as usize) << 4
    }

    /// Blocks available for save files, the number printed on the card label.
    pub fn usable_blocks(&self) -> usize {
        self.blocks() - RESERVED_BLOCKS
    }

    pub fn from_usable_blocks(blocks: usize) -> MemcardResult<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.usable_blocks() == blocks)
            .ok_or(MemcardError::InvalidCapacity(blocks as u16))
    }
}

impl TryFrom<u16> for CardSize {
    type Error = MemcardError;

    fn try_from(code: u16) -> MemcardResult<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.code() == code)
            .ok_or(MemcardError::InvalidCapacity(code))
    }
}

/// Character encoding used for file names and comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Encoding {
    #[default]
    Ansi = 0,
    ShiftJis = 1,
}

impl Encoding {
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl TryFrom<u16> for Encoding {
    type Error = MemcardError;

    fn try_from(code: u16) -> MemcardResult<Self> {
        match code {
            0 => Ok(Self::Ansi),
            1 => Ok(Self::ShiftJis),
            other => Err(MemcardError::InvalidEncoding(other)),
        }
    }
}

/// The card header, occupying the first block of the image.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Flash ID bound to the format time, see [`compute_serial`]
    pub serial: [u8; SERIAL_LENGTH],

    /// Ticks since the GameCube epoch at which the card was formatted
    pub format_time: u64,

    pub counter_bias: u32,

    pub language: u32,

    /// Either 0 or 1 as a word on every card seen so far
    pub unknown: [u8; HEADER_RESERVED_1_SIZE],

    pub device_id: u16,

    /// Capacity in megabits, see [`CardSize`]
    pub card_size: u16,

    /// See [`Encoding`]
    pub encoding: u16,

    #[br(temp)]
    #[bw(calc = [RESERVED_FILL; HEADER_RESERVED_2_SIZE])]
    reserved2: [u8; HEADER_RESERVED_2_SIZE],

    pub update_counter: u16,

    pub checksum: Checksums,

    #[br(temp)]
    #[bw(calc = [RESERVED_FILL; HEADER_RESERVED_3_SIZE])]
    reserved3: [u8; HEADER_RESERVED_3_SIZE],
}

impl Header {
    /// Builds the header of a freshly formatted card. Checksums are left zeroed.
    pub fn new(
        flash_id: &[u8; SERIAL_LENGTH],
        format_time: u64,
        card_size: CardSize,
        encoding: Encoding,
    ) -> Self {
        Self {
            serial: compute_serial(flash_id, format_time),
            format_time,
            counter_bias: 0,
            language: 0,
            unknown: [0; HEADER_RESERVED_1_SIZE],
            device_id: 0,
            card_size: card_size.code(),
            encoding: encoding.code(),
            update_counter: HEADER_UNFORMATTED_COUNTER,
            checksum: Checksums::default(),
        }
    }

    /// Image size in bytes as declared by the card size code.
    pub fn size(&self) -> usize {
        (self.card_size as usize) << 17
    }

    /// Block count as declared by the card size code, reserved blocks included.
    pub fn block_count(&self) -> usize {
        (self.card_size as usize) << 4
    }

    pub fn usable_blocks(&self) -> usize {
        self.block_count().saturating_sub(RESERVED_BLOCKS)
    }

    pub fn card_size(&self) -> MemcardResult<CardSize> {
        CardSize::try_from(self.card_size)
    }

    pub fn encoding(&self) -> MemcardResult<Encoding> {
        Encoding::try_from(self.encoding)
    }

    pub fn flash_id(&self) -> [u8; SERIAL_LENGTH] {
        extract_flash_id(&self.serial, self.format_time)
    }

    /// The two serial numbers some titles embed in their save data.
    ///
    /// The leading 32 bytes of the serialized header (serial, format time,
    /// counter bias, language and the unknown word) are read back as eight
    /// big-endian words and folded with XOR into two values.
    pub fn serial_numbers(&self) -> MemcardResult<(u32, u32)> {
        let bytes = self.to_bytes()?;
        let mut words = [0u32; 8];
        BigEndian::read_u32_into(&bytes[..HEADER_SERIAL_WORDS_SPAN], &mut words);

        Ok((
            words[0] ^ words[2] ^ words[4] ^ words[6],
            words[1] ^ words[3] ^ words[5] ^ words[7],
        ))
    }
}

impl ChecksummedRecord for Header {
    const CHECKSUM_SPAN: Range<usize> = 0..HEADER_CHECKSUM_SPAN;

    fn checksums(&self) -> &Checksums {
        &self.checksum
    }

    fn checksums_mut(&mut self) -> &mut Checksums {
        &mut self.checksum
    }
}

/// Header size on disk, a single block.
pub const HEADER_SIZE: usize = BLOCK_SIZE;
