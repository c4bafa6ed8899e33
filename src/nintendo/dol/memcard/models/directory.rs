use crate::nintendo::dol::memcard::constants::{
    DIRECTORY_CHECKSUM_SPAN, DIRECTORY_RESERVED_SIZE, MAX_ENTRIES, RESERVED_FILL,
};
use crate::nintendo::dol::memcard::models::checksums::{Checksums, ChecksummedRecord};
use crate::nintendo::dol::memcard::models::dir_entry::DirectoryEntry;
use binrw::binrw;
use std::ops::Range;

/// The file table. Cards keep two copies, see [`super::CardCopy`].
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub entries: [DirectoryEntry; MAX_ENTRIES],

    #[br(temp)]
    #[bw(calc = [RESERVED_FILL; DIRECTORY_RESERVED_SIZE])]
    reserved: [u8; DIRECTORY_RESERVED_SIZE],

    pub update_counter: u16,

    pub checksum: Checksums,
}

impl Directory {
    pub fn new(update_counter: u16) -> Self {
        Self {
            entries: [DirectoryEntry::default(); MAX_ENTRIES],
            update_counter,
            checksum: Checksums::default(),
        }
    }

    pub fn live_entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|entry| !entry.is_empty())
    }

    /// Number of slots holding a file.
    pub fn count(&self) -> usize {
        self.live_entries().count()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= MAX_ENTRIES
    }

    pub fn contains(&self, filename: &[u8]) -> bool {
        self.live_entries()
            .any(|entry| entry.filename_bytes() == filename)
    }
}

impl ChecksummedRecord for Directory {
    const CHECKSUM_SPAN: Range<usize> = 0..DIRECTORY_CHECKSUM_SPAN;

    fn checksums(&self) -> &Checksums {
        &self.checksum
    }

    fn checksums_mut(&mut self) -> &mut Checksums {
        &mut self.checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nintendo::dol::memcard::constants::BLOCK_SIZE;
    use binrw::BinRead;
    use std::io::Cursor;

    #[test]
    fn test_directory_layout() {
        let mut directory = Directory::new(1);
        directory.update_checksums().unwrap();

        let bytes = directory.to_bytes().unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert!(bytes[0x1FC0..0x1FFA].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[0x1FFA..0x1FFC], &[0x00, 0x01]);
        assert_eq!(&bytes[0x1FFC..0x1FFE], &directory.checksum.normal);
        assert_eq!(&bytes[0x1FFE..0x2000], &directory.checksum.inverted);
    }

    #[test]
    fn test_directory_read_back() {
        let mut directory = Directory::new(0);
        directory.entries[0] = DirectoryEntry::new(*b"GALE", *b"01", "SuperSmashBros0110290334", 11);
        directory.update_checksums().unwrap();

        let bytes = directory.to_bytes().unwrap();
        let read = Directory::read(&mut Cursor::new(&bytes)).unwrap();

        assert_eq!(read, directory);
        assert!(read.has_valid_checksums().unwrap());
        assert_eq!(read.count(), 1);
        assert!(read.contains(b"SuperSmashBros0110290334"));
        assert!(!read.contains(b"SuperSmashBros"));
    }

    #[test]
    fn test_directory_counter_is_checksummed() {
        let mut directory = Directory::new(1);
        directory.update_checksums().unwrap();
        directory.update_counter = 2;
        assert!(!directory.has_valid_checksums().unwrap());
    }

    #[test]
    fn test_directory_full() {
        let mut directory = Directory::new(1);
        assert!(!directory.is_full());
        for entry in directory.entries.iter_mut() {
            *entry = DirectoryEntry::new(*b"GALE", *b"01", "x", 1);
        }
        assert!(directory.is_full());
    }
}
