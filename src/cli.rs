use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warp-dump")]
#[command(author, version, about = "Inspect recorded WARP streams")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode one recorded stream (frame header plus payload)
    Inspect {
        /// Raw stream bytes, as received on one unidirectional stream
        #[arg(required = true)]
        file: PathBuf,

        /// Recorded init stream used to resolve segment samples
        #[arg(long)]
        init: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
