//! GameCube memory card images.
//!
//! A card image is a header block, two copies each of the file directory
//! and the block allocation map, and the usable 8 KiB blocks holding save
//! data. Saves are exchanged as GCI streams: the 64-byte directory entry
//! followed by the save's blocks.

use crate::nintendo::dol::memcard::constants::BLOCK_SIZE;
use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::models::header::HEADER_SIZE;
use indicatif::ProgressBar;
use log::{debug, info};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

pub mod card;
pub mod checksum;
pub mod constants;
pub mod error;
pub mod models;
pub mod patches;
pub mod reader;
pub mod serial;
pub mod writer;

pub use card::MemoryCard;
pub use reader::{File, FileReader, Metadata, Node, ReadDir, Reader};
pub use writer::{FileWriter, Writer, WriterOptions};

/// Whether the first `size` bytes of `reader` hold a memory card image.
pub fn detect_memory_card<R: Read + Seek>(reader: &mut R, size: u64) -> MemcardResult<bool> {
    MemoryCard::detect(reader, size)
}

pub async fn is_memory_card(path: &Path) -> MemcardResult<bool> {
    let size = fs::metadata(path).await?.len();
    if size < HEADER_SIZE as u64 {
        return Ok(false);
    }

    let mut header = vec![0u8; HEADER_SIZE];
    fs::File::open(path).await?.read_exact(&mut header).await?;

    detect_memory_card(&mut Cursor::new(header), size)
}

pub async fn open_reader(path: &Path) -> MemcardResult<Reader> {
    debug!("Opening memory card image: {:?}", path);
    let data = fs::read(path).await?;
    Reader::from_bytes(&data)
}

/// Decodes an image and walks the block chain of every file.
pub async fn verify_image(path: &Path) -> MemcardResult<MemoryCard> {
    let data = fs::read(path).await?;
    let card = MemoryCard::from_bytes(&data)?;

    for entry in card.active_directory().live_entries() {
        let chain = card.chain(entry.first_block)?;
        if chain.len() != entry.file_length as usize {
            return Err(MemcardError::InvalidBlockChain(entry.first_block));
        }
    }

    info!(
        "{:?} is a valid {} block memory card holding {} files",
        path,
        card.blocks.len(),
        card.count()
    );

    Ok(card)
}

/// Builds a new image at `output` from GCI files, in the given order.
/// Returns the number of files packed.
pub async fn pack_gci_files(
    output: &Path,
    inputs: &[PathBuf],
    options: WriterOptions,
    force: bool,
    progress: &ProgressBar,
) -> MemcardResult<usize> {
    if fs::metadata(output).await.is_ok() && !force {
        return Err(MemcardError::ImageAlreadyExists(output.to_path_buf()));
    }

    let writer = Writer::new(Vec::with_capacity(options.card_size.size()), options)?;
    progress.set_length(inputs.len() as u64);

    for input in inputs {
        debug!("Packing GCI file: {:?}", input);
        let data = fs::read(input).await?;

        let mut file = writer.create()?;
        file.append(&data)?;
        let entry = file.close()?;

        progress.set_message(entry.filename());
        progress.inc(1);
    }

    let count = writer.count();
    let image = writer.close()?;
    fs::write(output, &image).await?;

    progress.finish_and_clear();
    info!("Packed {} files into {:?}", count, output);

    Ok(count)
}

/// Writes every file on the card to `output_dir` as a GCI file.
pub async fn extract_gci_files(image: &Path, output_dir: &Path) -> MemcardResult<Vec<PathBuf>> {
    let reader = open_reader(image).await?;
    fs::create_dir_all(output_dir).await?;

    let mut written: Vec<PathBuf> = Vec::with_capacity(reader.files().len());

    for file in reader.files() {
        let stem = gci_stem(file);
        let mut path = output_dir.join(format!("{stem}.gci"));
        let mut n = 1;
        while written.contains(&path) {
            path = output_dir.join(format!("{stem}-{n}.gci"));
            n += 1;
        }

        let mut stream = file.open()?;
        let mut data = Vec::with_capacity(stream.len() as usize);
        stream.read_to_end(&mut data)?;

        debug!(
            "Extracting {} ({} blocks) to {:?}",
            file.name,
            data.len() / BLOCK_SIZE,
            path
        );
        fs::write(&path, &data).await?;
        written.push(path);
    }

    info!("Extracted {} files to {:?}", written.len(), output_dir);

    Ok(written)
}

/// `<maker>-<game>-<name>` with characters unsafe in file names replaced.
fn gci_stem(file: &File) -> String {
    format!("{}-{}-{}", file.maker_code, file.game_code, file.name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
