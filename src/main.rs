//! Tune Harvest - builds a local music folder from catalog playlists.
//!
//! Resolves (artist, title) references from a catalog into verified,
//! tagged audio files downloaded through yt-dlp, skipping anything already
//! acquired on earlier runs.

pub mod acquisition;
pub mod backend;
pub mod canonical;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod pipeline;
pub mod planner;
pub mod ranker;
#[cfg(test)]
pub mod test_utils;
pub mod verify;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive("tune_harvest=info".parse()?)
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
