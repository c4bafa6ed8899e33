use crate::nintendo::dol::memcard::constants::{DIR_ENTRY_SIZE, RESERVED_FILL, gamecube_epoch};
use crate::nintendo::dol::memcard::error::MemcardResult;
use binrw::{BinRead, BinWrite, Endian, binrw};
use chrono::{DateTime, Duration, Utc};
use std::io::Cursor;

pub const FILENAME_LENGTH: usize = 32;

/// A directory entry describing one save file.
///
/// The same 64-byte record prefixes a save exported as a `.gci` file.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub game_code: [u8; 4],

    pub maker_code: [u8; 2],

    #[br(temp)]
    #[bw(calc = RESERVED_FILL)]
    reserved1: u8,

    pub banner_format: u8,

    /// Zero padded
    pub filename: [u8; FILENAME_LENGTH],

    /// Seconds since the GameCube epoch
    pub last_modified: u32,

    pub image_data_offset: u32,

    pub icon_format: u16,

    pub animation_speed: u16,

    pub permissions: u8,

    pub copy_counter: u8,

    /// Raw block index, including the reserved system blocks
    pub first_block: u16,

    /// Length in blocks
    pub file_length: u16,

    #[br(temp)]
    #[bw(calc = [RESERVED_FILL; 2])]
    reserved2: [u8; 2],

    pub comment_address: u32,
}

impl DirectoryEntry {
    /// Creates an entry for a new save file. Name bytes beyond 32 are dropped.
    pub fn new(game_code: [u8; 4], maker_code: [u8; 2], filename: &str, file_length: u16) -> Self {
        let mut name = [0u8; FILENAME_LENGTH];
        let bytes = filename.as_bytes();
        let len = bytes.len().min(FILENAME_LENGTH);
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            game_code,
            maker_code,
            filename: name,
            file_length,
            ..Default::default()
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> MemcardResult<Self> {
        Ok(Self::read_options(&mut Cursor::new(bytes), Endian::Big, ())?)
    }

    pub fn to_bytes(&self) -> MemcardResult<[u8; DIR_ENTRY_SIZE]> {
        let mut bytes = [0u8; DIR_ENTRY_SIZE];
        self.write_options(&mut Cursor::new(&mut bytes[..]), Endian::Big, ())?;
        Ok(bytes)
    }

    /// Slots with an all-0xFF or all-zero game code hold no file.
    pub fn is_empty(&self) -> bool {
        self.game_code == [0xFF; 4] || self.game_code == [0x00; 4]
    }

    /// Stored name bytes with trailing zero padding removed.
    pub fn filename_bytes(&self) -> &[u8] {
        let end = self
            .filename
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.filename[..end]
    }

    pub fn filename(&self) -> String {
        String::from_utf8_lossy(self.filename_bytes()).into_owned()
    }

    pub fn game_code(&self) -> String {
        String::from_utf8_lossy(&self.game_code).into_owned()
    }

    pub fn maker_code(&self) -> String {
        String::from_utf8_lossy(&self.maker_code).into_owned()
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        gamecube_epoch() + Duration::seconds(self.last_modified as i64)
    }
}
