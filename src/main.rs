use crate::commands::memcard::MemcardCommands;
use crate::commands::{Cli, Commands};
use anyhow::Result;
use clap::Parser;
use gc_memcard::nintendo::dol::memcard::{
    extract_gci_files, open_reader, pack_gci_files, verify_image,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::info;

mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let logger = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .build();

    let level = logger.filter();
    let pb = MultiProgress::new();

    LogWrapper::new(pb.clone(), logger).try_init()?;
    log::set_max_level(level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Memcard(inner) => match inner {
            MemcardCommands::Info(cmd) => {
                let reader = open_reader(&cmd.image).await?;
                let card = reader.card();
                let header = &card.header;

                info!("Card size: {} blocks", header.usable_blocks());
                info!("Encoding: {:?}", reader.encoding()?);
                info!("Flash ID: {}", hex::encode(reader.flash_id()));
                info!("Format time: {} ticks", header.format_time);
                info!(
                    "Active copies: {} directory, {} block map",
                    card.active_directory_copy(),
                    card.active_block_map_copy()
                );
                info!(
                    "Files: {}, free blocks: {}",
                    card.count(),
                    card.active_block_map().free_blocks
                );
            }
            MemcardCommands::List(cmd) => {
                let reader = open_reader(&cmd.image).await?;
                for entry in reader.read_dir(&cmd.path)? {
                    if entry.is_dir {
                        info!("{:o} {}/", entry.mode(), entry.name);
                    } else {
                        info!(
                            "{:o} {:>8} {} {}",
                            entry.mode(),
                            entry.size,
                            entry
                                .modified
                                .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                                .unwrap_or_default(),
                            entry.name
                        );
                    }
                }
            }
            MemcardCommands::Extract(cmd) => {
                extract_gci_files(&cmd.image, &cmd.output).await?;
            }
            MemcardCommands::Pack(cmd) => {
                let bar = pb.add(ProgressBar::new(cmd.inputs.len() as u64));
                bar.set_style(ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} {msg}",
                )?);

                pack_gci_files(
                    &cmd.output,
                    &cmd.inputs,
                    cmd.writer_options(),
                    cmd.force,
                    &bar,
                )
                .await?;
            }
            MemcardCommands::Verify(cmd) => {
                verify_image(&cmd.image).await?;
            }
        },
    }

    Ok(())
}
