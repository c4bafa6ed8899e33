use std::fmt;

pub mod block_map;
pub mod checksums;
pub mod dir_entry;
pub mod directory;
pub mod header;

pub use block_map::BlockMap;
pub use checksums::{Checksums, ChecksummedRecord};
pub use dir_entry::DirectoryEntry;
pub use directory::Directory;
pub use header::{CardSize, Encoding, Header};

/// Number of redundant directory and block map copies.
pub const COPIES: usize = 2;

/// One of the two redundant directory or block map copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardCopy {
    Master = 0,
    Backup = 1,
}

impl CardCopy {
    pub const ALL: [CardCopy; COPIES] = [CardCopy::Master, CardCopy::Backup];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Picks the copy with the strictly greater update counter, ties go to the master.
    pub fn active(master_counter: u16, backup_counter: u16) -> Self {
        if backup_counter > master_counter {
            Self::Backup
        } else {
            Self::Master
        }
    }

    /// The redundant pair is consistent only when the counters are exactly one apart.
    pub fn counters_consistent(master_counter: u16, backup_counter: u16) -> bool {
        (master_counter as i32 - backup_counter as i32).abs() == 1
    }
}

impl fmt::Display for CardCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Backup => write!(f, "backup"),
        }
    }
}
