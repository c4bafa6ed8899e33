use crate::nintendo::dol::memcard::models::CardCopy;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Region of the card image a checksum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardRegion {
    Header,
    Directory(CardCopy),
    BlockMap(CardCopy),
}

impl fmt::Display for CardRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Directory(copy) => write!(f, "{copy} directory"),
            Self::BlockMap(copy) => write!(f, "{copy} block map"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MemcardError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    #[error("Not a valid capacity: {0:#06x}")]
    InvalidCapacity(u16),

    #[error("Not a valid encoding: {0:#06x}")]
    InvalidEncoding(u16),

    #[error("Trailing bytes after the last block")]
    TrailingData,

    #[error("Bad {0} checksum")]
    BadChecksum(CardRegion),

    #[error("Invalid directory update counters")]
    InvalidDirectoryCounters,

    #[error("Invalid block allocation map update counters")]
    InvalidBlockMapCounters,

    #[error("No free space left on the memory card")]
    NoFreeSpace,

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Invalid length")]
    InvalidLength,

    #[error("Game code {0:02x?} marks an empty directory slot")]
    InvalidGameCode([u8; 4]),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Block chain references invalid block {0:#06x}")]
    InvalidBlockChain(u16),

    #[error("The memory card writer has already been closed")]
    WriterClosed,

    #[error("Memory card image already exists: {0:?}")]
    ImageAlreadyExists(PathBuf),
}

pub type MemcardResult<T> = Result<T, MemcardError>;
