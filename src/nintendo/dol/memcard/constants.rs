use chrono::{DateTime, TimeZone, Utc};

/// Size of a single memory card block, the unit of file allocation.
pub const BLOCK_SIZE: usize = 0x2000;

/// The first five blocks hold the header, two directories and two block maps.
pub const RESERVED_BLOCKS: usize = 5;

/// Maximum number of files a directory can hold.
pub const MAX_ENTRIES: usize = 127;

/// Size of a serialized directory entry, which is also the GCI file header.
pub const DIR_ENTRY_SIZE: usize = 0x40;

/// Number of chain slots in a block map, one per usable block of the largest card.
pub const BLOCK_MAP_ENTRIES: usize = 0x0FFB;

/// Marks the end of a block chain.
pub const CHAIN_END: u16 = 0xFFFF;

/// Header update counter value written on a freshly formatted card.
pub const HEADER_UNFORMATTED_COUNTER: u16 = 0xFFFF;

/// Fill byte used for reserved spans and blank blocks.
pub const RESERVED_FILL: u8 = 0xFF;

pub const SERIAL_LENGTH: usize = 12;

pub const HEADER_RESERVED_1_SIZE: usize = 0x0004;
pub const HEADER_RESERVED_2_SIZE: usize = 0x01D4;
pub const HEADER_RESERVED_3_SIZE: usize = 0x1E00;

/// Header bytes covered by the header checksums.
pub const HEADER_CHECKSUM_SPAN: usize = 0x01FC;

/// Leading header bytes interpreted as eight big-endian words for the serial numbers.
pub const HEADER_SERIAL_WORDS_SPAN: usize = 0x20;

pub const DIRECTORY_RESERVED_SIZE: usize = 0x003A;

/// Directory bytes covered by the directory checksums.
pub const DIRECTORY_CHECKSUM_SPAN: usize = BLOCK_SIZE - 4;

/// Block map bytes preceding the checksummed area (the checksums themselves).
pub const BLOCK_MAP_CHECKSUM_OFFSET: usize = 4;

/// GameCube bus clock, the timer runs at a quarter of it divided by 1000.
pub const BUS_CLOCK: u64 = 162_000_000;
pub const TIMER_CLOCK: u64 = BUS_CLOCK / 4000;

/// 2000-01-01T00:00:00Z, the reference point for every on-card timestamp.
pub fn gamecube_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
