//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `fetch`: catalog lookup and the acquisition batch
//! - `clean`: remove unusable files from the save directory
//! - `index`: inspect and seed the dedup index
//! - `tools`: preflight checks, tool report and config bootstrap

mod clean;
mod fetch;
mod index;
mod tools;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};

pub use clean::cmd_clean;
pub use fetch::{FetchArgs, cmd_fetch};
pub use index::{cmd_index_key, cmd_index_seed, cmd_index_show};
pub use tools::{cmd_check_tools, cmd_init_config, preflight};

/// Tune Harvest CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: the OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Spotify client ID (overrides the config file)
    #[arg(long, global = true, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    pub spotify_client_id: Option<String>,

    /// Spotify client secret (overrides the config file)
    #[arg(long, global = true, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Find tracks in the catalog and download verified copies
    Fetch {
        /// Catalog search keyword (default: profile.keyword)
        #[arg(short, long)]
        keyword: Option<String>,
        /// Read references from a JSON file instead of the catalog
        #[arg(long)]
        tracks: Option<PathBuf>,
        /// Maximum number of references to process
        #[arg(long)]
        max_tracks: Option<usize>,
        /// Plan and rank only, without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete unreadable or out-of-bounds files from the save directory
    Clean {
        /// Re-tag surviving files and offer them to the library
        #[arg(long)]
        retag: bool,
    },
    /// Inspect or seed the dedup index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Check that yt-dlp, ffmpeg and credentials are available
    CheckTools,
    /// Write a default config file
    InitConfig {
        /// Destination (default: the --config path or the OS config directory)
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// `index` subcommands
#[derive(Subcommand)]
pub enum IndexAction {
    /// List the stored keys
    Show,
    /// Add verified files from the save directory
    Seed,
    /// Print the canonical key for an artist and title
    Key { artist: String, title: String },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::InitConfig { path, force } = &cli.command {
        let path = path.as_ref().or(cli.config.as_ref());
        return cmd_init_config(path.map(PathBuf::as_path), *force);
    }

    let config = load_config(cli)?;
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Fetch {
            keyword,
            tracks,
            max_tracks,
            dry_run,
        } => cmd_fetch(
            &rt,
            config,
            FetchArgs {
                keyword: keyword.clone(),
                tracks: tracks.clone(),
                max_tracks: *max_tracks,
                dry_run: *dry_run,
            },
        ),
        Commands::Clean { retag } => cmd_clean(&rt, &config, *retag),
        Commands::Index { action } => match action {
            IndexAction::Show => cmd_index_show(&config),
            IndexAction::Seed => cmd_index_seed(&config),
            IndexAction::Key { artist, title } => cmd_index_key(artist, title),
        },
        Commands::CheckTools => cmd_check_tools(&rt, &config),
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Load config from `--config` (strict) or the default location (lenient),
/// then apply credential overrides from flags or the environment.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    if let Some(id) = &cli.spotify_client_id {
        config.credentials.spotify_client_id = Some(id.clone());
    }
    if let Some(secret) = &cli.spotify_client_secret {
        config.credentials.spotify_client_secret = Some(secret.clone());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "tune-harvest",
            "--config",
            "/tmp/c.toml",
            "fetch",
            "--keyword",
            "afropop",
            "--max-tracks",
            "5",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        match cli.command {
            Commands::Fetch {
                keyword,
                max_tracks,
                dry_run,
                tracks,
            } => {
                assert_eq!(keyword.as_deref(), Some("afropop"));
                assert_eq!(max_tracks, Some(5));
                assert!(dry_run);
                assert!(tracks.is_none());
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_parse_index_key() {
        let cli = Cli::try_parse_from(["tune-harvest", "index", "key", "Drake", "Take Care"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index {
                action: IndexAction::Key { .. }
            }
        ));
    }

    #[test]
    fn test_explicit_config_missing_is_error() {
        let cli = Cli::try_parse_from([
            "tune-harvest",
            "--config",
            "/nonexistent/tune-harvest.toml",
            "check-tools",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_credential_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[credentials]\nspotify_client_id = \"from-file\"\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "tune-harvest",
            "--config",
            path_arg.as_str(),
            "--spotify-client-id",
            "from-flag",
            "check-tools",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.credentials.spotify_client_id.as_deref(), Some("from-flag"));
    }
}
