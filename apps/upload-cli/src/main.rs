//! Ledger command-line uploader entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use ledger_transfer::parse_size_bytes;
use tracing_subscriber::EnvFilter;

/// Uploads local files and folders to a Ledger server in chunks.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Files or directories to upload. Directories are uploaded recursively.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Server origin, e.g. `https://files.example.com`.
    #[arg(long)]
    pub server: Option<String>,

    /// Remote destination directory.
    #[arg(long = "path", value_name = "DIR")]
    pub destination: Option<String>,

    /// Chunk size, e.g. `8mb`.
    #[arg(long, value_parser = parse_chunk_size)]
    pub chunk_size: Option<u64>,

    /// Number of chunks uploaded in parallel.
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Content type sent for every file instead of guessing it.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Alternative configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not draw the progress line.
    #[arg(long, short)]
    pub quiet: bool,
}

fn parse_chunk_size(input: &str) -> Result<u64, String> {
    match parse_size_bytes(input) {
        Ok(0) => Err("chunk size must be greater than zero".into()),
        Ok(size) => Ok(size),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,ledger=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(args.config.as_deref())?;
    config.apply_args(&args);
    tracing::debug!(
        server = %config.server,
        destination = %config.destination,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(args, config))
}
