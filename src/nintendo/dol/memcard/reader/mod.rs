use crate::nintendo::dol::memcard::card::MemoryCard;
use crate::nintendo::dol::memcard::constants::{BLOCK_SIZE, DIR_ENTRY_SIZE, SERIAL_LENGTH};
use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::models::{CardSize, DirectoryEntry, Encoding};
use crate::nintendo::dol::memcard::reader::fs::{
    IndexEntry, ROOT, build_index, children, is_valid_path, lookup,
};
use chrono::{DateTime, Utc};
use log::debug;
use std::io::{Cursor, Read, Seek};
use std::sync::{Arc, OnceLock};

pub mod file;
pub mod fs;

pub use file::FileReader;
pub use fs::{Metadata, ReadDir};

/// A save file stored on the card.
#[derive(Debug, Clone)]
pub struct File {
    /// Stored file name without its zero padding. Bytes that are not valid
    /// UTF-8 are replaced, so distinct raw names can map to the same `name`;
    /// [`File::entry`] keeps the raw bytes.
    pub name: String,
    pub modified: DateTime<Utc>,
    /// Size of the GCI stream, directory entry included
    pub size: u64,
    pub game_code: String,
    pub maker_code: String,

    entry: DirectoryEntry,
    card: Arc<MemoryCard>,
}

impl File {
    fn new(entry: DirectoryEntry, card: Arc<MemoryCard>) -> Self {
        Self {
            name: entry.filename(),
            modified: entry.last_modified(),
            size: (DIR_ENTRY_SIZE + entry.file_length as usize * BLOCK_SIZE) as u64,
            game_code: entry.game_code(),
            maker_code: entry.maker_code(),
            entry,
            card,
        }
    }

    /// Opens the file as a GCI stream: its directory entry followed by its blocks.
    pub fn open(&self) -> MemcardResult<FileReader> {
        FileReader::new(self.card.clone(), &self.entry)
    }

    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    pub fn metadata(&self) -> Metadata {
        let (_, name) = fs::split(&self.name);
        Metadata {
            name: name.to_string(),
            size: self.size,
            modified: Some(self.modified),
            is_dir: false,
        }
    }
}

/// An opened path, either a readable file or a listable directory.
#[derive(Debug)]
pub enum Node<'a> {
    File(FileReader),
    Dir(ReadDir<'a>),
}

/// Read-only view of a memory card image as a file system.
#[derive(Debug)]
pub struct Reader {
    card: Arc<MemoryCard>,
    files: Vec<File>,
    index: OnceLock<Vec<IndexEntry>>,
}

impl Reader {
    /// Decodes and validates an image. Any fault aborts construction.
    pub fn new<R: Read + Seek>(mut reader: R) -> MemcardResult<Self> {
        let card = MemoryCard::from_reader(&mut reader)?;
        Ok(Self::from_validated(card))
    }

    pub fn from_bytes(bytes: &[u8]) -> MemcardResult<Self> {
        Self::new(Cursor::new(bytes))
    }

    /// Wraps a card built in memory, validating it first.
    pub fn from_card(card: MemoryCard) -> MemcardResult<Self> {
        card.validate()?;
        Ok(Self::from_validated(card))
    }

    fn from_validated(card: MemoryCard) -> Self {
        let card = Arc::new(card);

        let files: Vec<File> = card
            .active_directory()
            .live_entries()
            .map(|entry| File::new(*entry, card.clone()))
            .collect();

        debug!("Memory card holds {} files", files.len());

        Self {
            card,
            files,
            index: OnceLock::new(),
        }
    }

    /// Files in directory order.
    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn card(&self) -> &MemoryCard {
        &self.card
    }

    pub fn card_size(&self) -> MemcardResult<CardSize> {
        self.card.header.card_size()
    }

    pub fn encoding(&self) -> MemcardResult<Encoding> {
        self.card.header.encoding()
    }

    /// Flash ID of the card that formatted this image.
    pub fn flash_id(&self) -> [u8; SERIAL_LENGTH] {
        self.card.header.flash_id()
    }

    fn index(&self) -> &[IndexEntry] {
        self.index.get_or_init(|| build_index(&self.files))
    }

    fn resolve(&self, name: &str) -> MemcardResult<IndexEntry> {
        if !is_valid_path(name) {
            return Err(MemcardError::InvalidPath(name.to_string()));
        }

        if name == ROOT {
            return Ok(IndexEntry::root());
        }

        let entry = lookup(self.index(), name)
            .ok_or_else(|| MemcardError::NotFound(name.to_string()))?;

        if entry.is_duplicate {
            return Err(MemcardError::DuplicateName(name.to_string()));
        }

        Ok(entry.clone())
    }

    /// Opens `name` with slash separated, unrooted path semantics. `.` is the root.
    pub fn open(&self, name: &str) -> MemcardResult<Node<'_>> {
        let entry = self.resolve(name)?;

        match entry.file {
            Some(file) if !entry.is_dir => Ok(Node::File(self.files[file].open()?)),
            _ => Ok(Node::Dir(ReadDir::new(
                name,
                children(self.index(), name),
                &self.files,
            ))),
        }
    }

    pub fn metadata(&self, name: &str) -> MemcardResult<Metadata> {
        self.resolve(name)?.stat(&self.files)
    }

    /// Lists every entry of the directory `name`.
    pub fn read_dir(&self, name: &str) -> MemcardResult<Vec<Metadata>> {
        match self.open(name)? {
            Node::Dir(mut dir) => Ok(dir.read_dir(0)?.unwrap_or_default()),
            Node::File(_) => Err(MemcardError::NotADirectory(name.to_string())),
        }
    }

    /// Reads the whole GCI stream of the file `name`.
    pub fn read(&self, name: &str) -> MemcardResult<Vec<u8>> {
        match self.open(name)? {
            Node::File(mut file) => {
                let mut data = Vec::with_capacity(file.len() as usize);
                file.read_to_end(&mut data)?;
                Ok(data)
            }
            Node::Dir(_) => Err(MemcardError::IsADirectory(name.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nintendo::dol::memcard::constants::{CHAIN_END, RESERVED_BLOCKS};
    use crate::nintendo::dol::memcard::models::CardCopy;
    use std::io::SeekFrom;
    use std::thread;

    /// Places files on a blank card directly, bypassing the writer.
    pub(crate) fn card_with(files: &[(&str, u16)]) -> MemoryCard {
        let mut card =
            MemoryCard::new_blank(&[0; SERIAL_LENGTH], 1, CardSize::MemoryCard59, Encoding::Ansi)
                .unwrap();

        let mut next = RESERVED_BLOCKS as u16;
        for (slot, (name, length)) in files.iter().enumerate() {
            let mut entry = DirectoryEntry::new(*b"GTST", *b"01", name, *length);
            entry.first_block = next;
            entry.last_modified = 60 * slot as u32;

            for i in 0..*length {
                let raw = next + i;
                let usable = raw as usize - RESERVED_BLOCKS;
                card.blocks[usable] = [slot as u8 * 16 + i as u8; BLOCK_SIZE];
                card.active_block_map_mut().blocks[usable] =
                    if i + 1 < *length { raw + 1 } else { CHAIN_END };
            }

            card.active_directory_mut().entries[slot] = entry;
            next += length;
        }

        card.update_checksums().unwrap();
        card
    }

    fn reader_with(files: &[(&str, u16)]) -> Reader {
        let bytes = card_with(files).to_bytes().unwrap();
        Reader::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_files() {
        let reader = reader_with(&[("fzc.dat", 2), ("gc4sword", 1)]);
        let files = reader.files();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "fzc.dat");
        assert_eq!(files[0].size, 64 + 2 * 8192);
        assert_eq!(files[0].game_code, "GTST");
        assert_eq!(files[0].maker_code, "01");
        assert_eq!(files[1].name, "gc4sword");
        assert_eq!(
            files[1].modified,
            crate::nintendo::dol::memcard::constants::gamecube_epoch()
                + chrono::Duration::seconds(60)
        );
        assert_eq!(reader.card_size().unwrap(), CardSize::MemoryCard59);
        assert_eq!(reader.encoding().unwrap(), Encoding::Ansi);
        assert_eq!(reader.flash_id(), [0; SERIAL_LENGTH]);
    }

    #[test]
    fn test_file_stream() {
        let reader = reader_with(&[("first", 1), ("second", 3)]);
        let data = reader.read("second").unwrap();

        assert_eq!(data.len(), 64 + 3 * 8192);
        let entry = DirectoryEntry::from_bytes(&data[..64]).unwrap();
        assert_eq!(entry.filename(), "second");
        assert_eq!(entry.first_block, 6);
        assert!(data[64..64 + 8192].iter().all(|&b| b == 0x10));
        assert!(data[64 + 8192..64 + 2 * 8192].iter().all(|&b| b == 0x11));
        assert!(data[64 + 2 * 8192..].iter().all(|&b| b == 0x12));
    }

    #[test]
    fn test_file_stream_seek() {
        let reader = reader_with(&[("save", 2)]);
        let mut stream = reader.files()[0].open().unwrap();

        assert_eq!(stream.len(), 64 + 2 * 8192);
        assert_eq!(stream.blocks(), &[0, 1]);

        stream.seek(SeekFrom::Start(64 + 8192 - 1)).unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x01]);

        stream.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 0);

        assert!(stream.seek(SeekFrom::Current(-1_000_000)).is_err());
    }

    #[test]
    fn test_concurrent_streams() {
        let reader = reader_with(&[("a", 2), ("b", 2), ("c", 1)]);
        let expected: Vec<Vec<u8>> = reader
            .files()
            .iter()
            .map(|file| reader.read(&file.name).unwrap())
            .collect();

        let streams: Vec<FileReader> = reader
            .files()
            .iter()
            .map(|file| file.open().unwrap())
            .collect();

        let handles: Vec<_> = streams
            .into_iter()
            .map(|mut stream| {
                thread::spawn(move || {
                    let mut data = Vec::new();
                    stream.read_to_end(&mut data).unwrap();
                    data
                })
            })
            .collect();

        for (handle, expected) in handles.into_iter().zip(expected) {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_open_directory() {
        let reader = reader_with(&[("a/c.dat", 1), ("a/b.dat", 1), ("top", 1)]);

        let Node::Dir(mut dir) = reader.open("a").unwrap() else {
            panic!("expected a directory");
        };
        let names: Vec<String> = dir
            .read_dir(0)
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["b.dat", "c.dat"]);

        let meta = reader.metadata("a").unwrap();
        assert!(meta.is_dir);
        assert_eq!(meta.name, "a");
        assert_eq!(meta.modified, None);
    }

    #[test]
    fn test_root_listing() {
        let reader = reader_with(&[("zeta", 1), ("a/b.dat", 1), ("alpha", 1)]);
        let root = reader.read_dir(".").unwrap();

        let listed: Vec<(&str, bool)> = root.iter().map(|m| (m.name.as_str(), m.is_dir)).collect();
        assert_eq!(listed, vec![("a", true), ("alpha", false), ("zeta", false)]);
    }

    #[test]
    fn test_read_dir_paging() {
        let reader = reader_with(&[("a", 1), ("b", 1), ("c", 1)]);
        let Node::Dir(mut dir) = reader.open(".").unwrap() else {
            panic!("expected a directory");
        };

        assert_eq!(dir.read_dir(2).unwrap().unwrap().len(), 2);
        assert_eq!(dir.read_dir(2).unwrap().unwrap().len(), 1);
        assert!(dir.read_dir(2).unwrap().is_none());
        assert_eq!(dir.read_dir(0).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_read_dir_iterator() {
        let reader = reader_with(&[("x/1", 1), ("x/2", 1)]);
        let Node::Dir(dir) = reader.open("x").unwrap() else {
            panic!("expected a directory");
        };

        let names: Vec<String> = dir.map(|m| m.unwrap().name).collect();
        assert_eq!(names, vec!["1", "2"]);
    }

    #[test]
    fn test_open_errors() {
        let reader = reader_with(&[("a/b.dat", 1)]);

        for bad in ["", "/a", "a/", "../a", "a/./b.dat"] {
            assert!(
                matches!(reader.open(bad), Err(MemcardError::InvalidPath(_))),
                "{bad}"
            );
        }

        assert!(matches!(
            reader.open("missing"),
            Err(MemcardError::NotFound(_))
        ));
        assert!(matches!(
            reader.read("a"),
            Err(MemcardError::IsADirectory(_))
        ));
        assert!(matches!(
            reader.read_dir("a/b.dat"),
            Err(MemcardError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_duplicate_names() {
        let reader = reader_with(&[("save", 1), ("save", 1), ("other", 1)]);

        assert_eq!(reader.files().len(), 3);
        assert!(matches!(
            reader.open("save"),
            Err(MemcardError::DuplicateName(_))
        ));
        assert!(matches!(
            reader.metadata("save"),
            Err(MemcardError::DuplicateName(_))
        ));
        assert!(reader.read("other").is_ok());

        // The listing surfaces the fault when it reaches the duplicate
        assert!(reader.read_dir(".").is_err());
    }

    #[test]
    fn test_file_shadowing_directory_is_duplicate() {
        let reader = reader_with(&[("a", 1), ("a/b", 1)]);
        assert!(matches!(
            reader.open("a"),
            Err(MemcardError::DuplicateName(_))
        ));
        assert!(reader.read("a/b").is_ok());
    }

    #[test]
    fn test_reads_backup_copy_when_active() {
        let mut card = card_with(&[("save", 1)]);

        // Promote the backup copies, which hold no files
        card.directories[CardCopy::Backup.index()].update_counter = 2;
        card.block_maps[CardCopy::Backup.index()].update_counter = 2;
        card.directories[CardCopy::Master.index()].update_counter = 1;
        card.update_checksums().unwrap();

        let reader = Reader::from_bytes(&card.to_bytes().unwrap()).unwrap();
        assert!(reader.files().is_empty());
    }

    #[test]
    fn test_invalid_image_aborts_reader() {
        let mut bytes = card_with(&[("save", 1)]).to_bytes().unwrap();
        bytes[BLOCK_SIZE + 8] ^= 0xFF;
        assert!(matches!(
            Reader::from_bytes(&bytes),
            Err(MemcardError::BadChecksum(_))
        ));
    }

    #[test]
    fn test_from_card_validates() {
        let card = card_with(&[("save", 1)]);
        assert_eq!(Reader::from_card(card.clone()).unwrap().files().len(), 1);

        let mut corrupt = card;
        corrupt.directories[CardCopy::Master.index()].update_counter = 5;
        assert!(matches!(
            Reader::from_card(corrupt),
            Err(MemcardError::BadChecksum(_))
        ));

        let mut gap = card_with(&[]);
        gap.block_maps[CardCopy::Master.index()].update_counter = 3;
        gap.update_checksums().unwrap();
        assert!(matches!(
            Reader::from_card(gap),
            Err(MemcardError::InvalidBlockMapCounters)
        ));
    }

    #[test]
    fn test_non_utf8_names_collapse() {
        let mut card = card_with(&[("xa", 1), ("ya", 1)]);
        let directory = card.active_directory_mut();
        directory.entries[0].filename[0] = 0xFE;
        directory.entries[1].filename[0] = 0xFF;
        card.update_checksums().unwrap();

        let reader = Reader::from_card(card).unwrap();
        let files = reader.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, files[1].name);
        assert_ne!(files[0].entry().filename_bytes(), files[1].entry().filename_bytes());

        // Both stay readable through their own handles
        assert!(files[0].open().is_ok());
        assert!(files[1].open().is_ok());
        assert!(matches!(
            reader.open(&files[0].name),
            Err(MemcardError::DuplicateName(_))
        ));
    }
}
