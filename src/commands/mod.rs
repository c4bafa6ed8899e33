use crate::commands::memcard::MemcardCommands;
use clap::{Parser, Subcommand};

pub mod memcard;

/// CLI for inspecting, verifying and building GameCube memory card images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(subcommand)]
    Memcard(MemcardCommands),
}
