use crate::nintendo::dol::memcard::card::MemoryCard;
use crate::nintendo::dol::memcard::constants::{
    BLOCK_SIZE, CHAIN_END, DIR_ENTRY_SIZE, RESERVED_BLOCKS, SERIAL_LENGTH,
};
use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::models::{CardSize, DirectoryEntry, Encoding};
use crate::nintendo::dol::memcard::patches::TitlePatch;
use crate::nintendo::dol::memcard::serial::format_time_now;
use log::{debug, info};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Parameters for formatting the card a [`Writer`] builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub card_size: CardSize,
    pub encoding: Encoding,
    pub flash_id: [u8; SERIAL_LENGTH],
    /// Console timer ticks since the GameCube epoch
    pub format_time: u64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            card_size: CardSize::MemoryCard59,
            encoding: Encoding::Ansi,
            flash_id: [0; SERIAL_LENGTH],
            format_time: format_time_now(),
        }
    }
}

struct WriterState {
    card: MemoryCard,
    /// Buffers of sinks not yet closed, keyed by creation order
    pending: BTreeMap<u64, Vec<u8>>,
    next_id: u64,
    finalized: bool,
}

impl WriterState {
    /// Largest GCI stream a sink accepts.
    fn max_size(&self) -> usize {
        (self.card.size() + DIR_ENTRY_SIZE).saturating_sub(RESERVED_BLOCKS * BLOCK_SIZE)
    }

    /// Validates a buffered GCI stream and stores it on the card.
    ///
    /// Every check runs before the card is touched, so a rejected file leaves
    /// the card exactly as it was.
    fn commit(&mut self, data: Vec<u8>) -> MemcardResult<DirectoryEntry> {
        if data.len() < DIR_ENTRY_SIZE {
            return Err(MemcardError::InvalidLength);
        }

        let (header, payload) = data.split_at(DIR_ENTRY_SIZE);
        let mut entry = DirectoryEntry::from_bytes(header)?;

        if self.card.active_directory().contains(entry.filename_bytes()) {
            return Err(MemcardError::DuplicateName(entry.filename()));
        }

        // Such an entry would be committed but never listed
        if entry.is_empty() {
            return Err(MemcardError::InvalidGameCode(entry.game_code));
        }

        let length = entry.file_length as usize;
        if length == 0 || payload.len() != length * BLOCK_SIZE {
            return Err(MemcardError::InvalidLength);
        }

        let slot = self.card.count();
        let directory = self.card.active_directory();
        if directory.is_full() || !directory.entries[slot].is_empty() {
            return Err(MemcardError::NoFreeSpace);
        }

        let block_map = self.card.active_block_map();
        let first = block_map.last_allocated_block as usize + 1;
        if length > block_map.free_blocks as usize
            || first < RESERVED_BLOCKS
            || first - RESERVED_BLOCKS + length > self.card.blocks.len()
        {
            return Err(MemcardError::NoFreeSpace);
        }

        let mut payload = payload.to_vec();
        if let Some(patch) = TitlePatch::for_filename(entry.filename_bytes()) {
            patch.apply(&mut payload, self.card.serial_numbers()?)?;
        }

        entry.first_block = first as u16;

        let start = first - RESERVED_BLOCKS;
        for (i, chunk) in payload.chunks_exact(BLOCK_SIZE).enumerate() {
            self.card.blocks[start + i].copy_from_slice(chunk);
        }

        let block_map = self.card.active_block_map_mut();
        for i in start..start + length {
            block_map.blocks[i] = if i + 1 < start + length {
                (i + 1 + RESERVED_BLOCKS) as u16
            } else {
                CHAIN_END
            };
        }
        block_map.last_allocated_block += length as u16;
        block_map.free_blocks -= length as u16;

        self.card.active_directory_mut().entries[slot] = entry;
        self.card.update_checksums()?;

        debug!(
            "Committed {} to slot {} ({} blocks from block {})",
            entry.filename(),
            slot,
            length,
            first
        );

        Ok(entry)
    }
}

fn lock(state: &Mutex<WriterState>) -> MutexGuard<'_, WriterState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a memory card image from GCI streams and writes it to `W` on close.
///
/// Files are created through [`Writer::create`] and may be written from
/// several threads at once; commits are serialized on the card.
pub struct Writer<W: Write> {
    sink: W,
    state: Arc<Mutex<WriterState>>,
}

impl<W: Write> Writer<W> {
    /// Starts from a freshly formatted blank card.
    pub fn new(sink: W, options: WriterOptions) -> MemcardResult<Self> {
        let card = MemoryCard::new_blank(
            &options.flash_id,
            options.format_time,
            options.card_size,
            options.encoding,
        )?;

        Ok(Self::with_card(sink, card))
    }

    /// Starts from an existing image. New files are still appended after the
    /// last allocated block.
    pub fn with_card(sink: W, card: MemoryCard) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(WriterState {
                card,
                pending: BTreeMap::new(),
                next_id: 0,
                finalized: false,
            })),
        }
    }

    /// Opens a sink for one GCI stream.
    pub fn create(&self) -> MemcardResult<FileWriter> {
        let mut state = lock(&self.state);

        if state.finalized {
            return Err(MemcardError::WriterClosed);
        }

        if state.card.active_directory().is_full() || state.card.active_block_map().free_blocks == 0
        {
            return Err(MemcardError::NoFreeSpace);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.pending.insert(id, Vec::new());

        Ok(FileWriter {
            id,
            max_size: state.max_size(),
            state: self.state.clone(),
        })
    }

    /// Number of files committed so far.
    pub fn count(&self) -> usize {
        lock(&self.state).card.count()
    }

    /// Copy of the card as committed so far.
    pub fn snapshot(&self) -> MemoryCard {
        lock(&self.state).card.clone()
    }

    /// Commits every sink still open, in creation order, then writes the image.
    pub fn close(mut self) -> MemcardResult<W> {
        let mut state = lock(&self.state);

        if state.finalized {
            return Err(MemcardError::WriterClosed);
        }
        state.finalized = true;

        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            debug!("Committing {} unclosed files", pending.len());
        }
        for data in pending.into_values() {
            state.commit(data)?;
        }

        let written = state.card.write_to(&mut self.sink)?;
        info!(
            "Wrote {} byte memory card image holding {} files",
            written,
            state.card.count()
        );

        drop(state);
        Ok(self.sink)
    }
}

/// Buffered sink for one GCI stream: a 64-byte directory entry followed by
/// `file_length` blocks of save data.
///
/// Nothing reaches the card until [`FileWriter::close`] or [`Writer::close`].
pub struct FileWriter {
    id: u64,
    max_size: usize,
    state: Arc<Mutex<WriterState>>,
}

impl FileWriter {
    pub fn append(&mut self, data: &[u8]) -> MemcardResult<()> {
        let mut state = lock(&self.state);

        if state.finalized {
            return Err(MemcardError::WriterClosed);
        }

        let buffer = state
            .pending
            .get_mut(&self.id)
            .ok_or(MemcardError::WriterClosed)?;

        if buffer.len() + data.len() > self.max_size {
            return Err(MemcardError::InvalidLength);
        }

        buffer.extend_from_slice(data);
        Ok(())
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        lock(&self.state)
            .pending
            .get(&self.id)
            .map_or(0, |buffer| buffer.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commits the buffered stream and returns the entry as stored.
    pub fn close(self) -> MemcardResult<DirectoryEntry> {
        let mut state = lock(&self.state);

        if state.finalized {
            return Err(MemcardError::WriterClosed);
        }

        let data = state
            .pending
            .remove(&self.id)
            .ok_or(MemcardError::WriterClosed)?;

        state.commit(data)
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.append(buf) {
            Ok(()) => Ok(buf.len()),
            Err(e @ MemcardError::InvalidLength) => {
                Err(io::Error::new(io::ErrorKind::InvalidInput, e))
            }
            Err(e) => Err(io::Error::other(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
