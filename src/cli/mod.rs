//! Command-line interface for tune-harvest.
//!
//! This module provides CLI commands for fetching tracks, cleaning the save
//! directory, inspecting the dedup index and checking the external tools.

mod commands;

pub use commands::{Cli, Commands, run_command};
