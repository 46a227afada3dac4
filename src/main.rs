//! Music Steward - a music-library reconciliation and sync engine.
//!
//! Aggregates album metadata from a streaming backend, MusicBrainz, Last.fm
//! and the local filesystem into one canonical catalog, downloads matched
//! audio under a concurrency ceiling and repairs catalog drift.

pub mod cli;
pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod import;
pub mod matching;
pub mod model;
pub mod reconcile;
pub mod sources;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("music_steward=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
