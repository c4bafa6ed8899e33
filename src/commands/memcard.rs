use clap::{Parser, Subcommand, ValueEnum};
use gc_memcard::nintendo::dol::memcard::WriterOptions;
use gc_memcard::nintendo::dol::memcard::constants::SERIAL_LENGTH;
use gc_memcard::nintendo::dol::memcard::models::{CardSize, Encoding};
use gc_memcard::nintendo::dol::memcard::serial::format_time_now;
use std::path::PathBuf;

/// Commands for GameCube memory card images
#[derive(Subcommand, Debug)]
pub enum MemcardCommands {
    Info(InfoCommand),
    List(ListCommand),
    Extract(ExtractCommand),
    Pack(PackCommand),
    Verify(VerifyCommand),
}

/// Prints the header of a memory card image.
#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    /// Memory card image path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
}

/// Lists the files stored on a memory card image.
#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// Memory card image path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Directory to list, `.` is the root
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: String,
}

/// Extracts every file of a memory card image as a GCI file.
#[derive(Parser, Debug, Clone)]
pub struct ExtractCommand {
    /// Memory card image path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Output directory for the GCI files
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

/// Builds a new memory card image from GCI files.
#[derive(Parser, Debug, Clone)]
#[command(
    long_about = "Builds a new memory card image from GCI files\n\nNote: F-Zero GX and Phantasy Star Online saves are re-stamped with the serial numbers of the new card"
)]
pub struct PackCommand {
    /// Output memory card image path
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// GCI files to store, in order
    #[arg(value_name = "GCI", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Usable block count of the card
    #[arg(long, value_name = "BLOCKS", default_value = "59", value_parser = parse_card_size)]
    pub card_size: CardSize,

    #[arg(long, value_enum, default_value_t = EncodingArg::Ansi)]
    pub encoding: EncodingArg,

    /// Flash ID of the console slot the card is formatted for, as 24 hex digits
    #[arg(long, value_name = "HEX", value_parser = parse_flash_id)]
    pub flash_id: Option<[u8; SERIAL_LENGTH]>,

    /// Format time in console timer ticks, defaults to now
    #[arg(long, value_name = "TICKS")]
    pub format_time: Option<u64>,

    /// Force overwrite of the output file if it already exists
    #[arg(long, short = 'f', value_name = "FORCE", default_value_t = false)]
    pub force: bool,
}

impl PackCommand {
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            card_size: self.card_size,
            encoding: self.encoding.into(),
            flash_id: self.flash_id.unwrap_or([0; SERIAL_LENGTH]),
            format_time: self.format_time.unwrap_or_else(format_time_now),
        }
    }
}

/// Verifies the checksums and block chains of a memory card image.
#[derive(Parser, Debug, Clone)]
pub struct VerifyCommand {
    /// Memory card image path
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingArg {
    Ansi,
    Sjis,
}

impl From<EncodingArg> for Encoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Ansi => Encoding::Ansi,
            EncodingArg::Sjis => Encoding::ShiftJis,
        }
    }
}

fn parse_card_size(value: &str) -> Result<CardSize, String> {
    let blocks: usize = value.parse().map_err(|e| format!("{e}"))?;
    CardSize::from_usable_blocks(blocks)
        .map_err(|_| "expected one of 59, 123, 251, 507, 1019 or 2043".to_string())
}

fn parse_flash_id(value: &str) -> Result<[u8; SERIAL_LENGTH], String> {
    let bytes = hex::decode(value).map_err(|e| format!("{e}"))?;
    bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes", SERIAL_LENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};

    #[test]
    fn test_pack_arguments() {
        let cli = Cli::try_parse_from([
            "gc-memcard",
            "memcard",
            "pack",
            "card.raw",
            "a.gci",
            "b.gci",
            "--card-size",
            "251",
            "--encoding",
            "sjis",
            "--flash-id",
            "00112233445566778899aabb",
            "--format-time",
            "42",
        ])
        .unwrap();

        let Commands::Memcard(MemcardCommands::Pack(cmd)) = cli.command else {
            panic!("expected the pack command");
        };

        assert_eq!(cmd.inputs, vec![PathBuf::from("a.gci"), PathBuf::from("b.gci")]);
        let options = cmd.writer_options();
        assert_eq!(options.card_size, CardSize::MemoryCard251);
        assert_eq!(options.encoding, Encoding::ShiftJis);
        assert_eq!(options.flash_id[11], 0xBB);
        assert_eq!(options.format_time, 42);
        assert!(!cmd.force);
    }

    #[test]
    fn test_pack_rejects_bad_values() {
        for args in [
            ["--card-size", "60"],
            ["--encoding", "utf8"],
            ["--flash-id", "0011"],
        ] {
            let result = Cli::try_parse_from(
                ["gc-memcard", "memcard", "pack", "card.raw", "a.gci"]
                    .into_iter()
                    .chain(args),
            );
            assert!(result.is_err(), "{args:?}");
        }
    }
}
