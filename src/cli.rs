use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spinneret", about = "Polite, resumable web crawler")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl one or more seed URLs.
    Crawl {
        /// Comma-separated seed URLs, or a path to a file with one per line.
        #[arg(long)]
        seeds: Option<String>,
        /// A single seed URL.
        #[arg(long)]
        seed: Option<String>,
        /// Override max crawl depth from the config.
        #[arg(long)]
        depth: Option<u32>,
        /// Write JSON-lines results here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Persist crawl state under this key for later `resume`.
        #[arg(long)]
        session_key: Option<String>,
    },
    /// Resume a previously interrupted crawl.
    Resume {
        #[arg(long)]
        session_key: String,
        /// Write JSON-lines results here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
