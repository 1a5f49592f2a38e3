//! CLI argument and command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "novella", version, about = "Streaming fiction generation gateway")]
pub struct Cli {
    /// Config file (defaults to ~/.novella/config.json).
    #[arg(long, global = true, env = "NOVELLA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one generation request and print wire events as NDJSON.
    Generate {
        /// Fixture library with users, balances and novels.
        #[arg(long)]
        library: PathBuf,

        /// Bearer token of the calling user.
        #[arg(long)]
        token: Option<String>,

        /// Request origin.
        #[arg(long)]
        origin: Option<String>,

        /// Directory for generation records (defaults to the user data dir).
        #[arg(long)]
        records_dir: Option<PathBuf>,

        /// Request body file, or `-` for stdin.
        request: String,
    },

    /// List backends and their capabilities.
    Providers,

    /// Price a request.
    Cost {
        /// Model id.
        #[arg(long)]
        model: String,

        /// Characters of linked chapter content.
        #[arg(long, default_value = "0")]
        linked_chars: u64,
    },

    /// List stored generation records.
    Records {
        /// User id.
        #[arg(long)]
        user: String,

        /// Maximum number of records to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Directory for generation records (defaults to the user data dir).
        #[arg(long)]
        records_dir: Option<PathBuf>,
    },
}
