//! Preflight checks, tool report and config bootstrap.

use std::path::Path;

use tokio::runtime::Runtime;

use crate::backend::YtDlp;
use crate::backend::ytdlp::ffmpeg_version;
use crate::config::{self, Config};
use crate::error::{Error, Result};

/// Fail fast on anything that would make every track fail.
///
/// Checks config values, the yt-dlp and ffmpeg executables, the cookies
/// file and, when the Spotify catalog will be used, its credentials.
pub async fn preflight(config: &Config, needs_catalog: bool) -> Result<()> {
    config.validate()?;

    let ytdlp = YtDlp::new(&config.download);
    let Some(version) = ytdlp.version().await else {
        return Err(Error::preflight(format!(
            "{} not found; install it with `pip install yt-dlp`",
            config.download.binary
        )));
    };
    tracing::info!("Using yt-dlp {}", version);

    if ffmpeg_version(config.download.ffmpeg_location.as_deref())
        .await
        .is_none()
    {
        return Err(Error::preflight(
            "ffmpeg not found; install it or set download.ffmpeg_location",
        ));
    }

    if let Some(cookies) = &config.download.cookies_file
        && !cookies.is_file()
    {
        return Err(Error::preflight(format!(
            "cookies file {:?} does not exist",
            cookies
        )));
    }

    if needs_catalog && !has_credentials(config) {
        return Err(Error::preflight(
            "Spotify credentials missing: set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET",
        ));
    }
    Ok(())
}

fn has_credentials(config: &Config) -> bool {
    let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    set(&config.credentials.spotify_client_id) && set(&config.credentials.spotify_client_secret)
}

/// Report tool availability and credentials
pub fn cmd_check_tools(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    println!("Checking download tools...\n");

    let (ytdlp, ffmpeg) = rt.block_on(async {
        let ytdlp = YtDlp::new(&config.download).version().await;
        let ffmpeg = ffmpeg_version(config.download.ffmpeg_location.as_deref()).await;
        (ytdlp, ffmpeg)
    });

    match ytdlp {
        Some(version) => println!("✓ {}: {}", config.download.binary, version),
        None => {
            println!("✗ {}: NOT FOUND", config.download.binary);
            println!("  Install with: pip install yt-dlp");
        }
    }

    match ffmpeg {
        Some(version) => println!("✓ ffmpeg: {}", version),
        None => {
            println!("✗ ffmpeg: NOT FOUND");
            println!("  Install ffmpeg or set download.ffmpeg_location");
        }
    }

    match &config.download.cookies_file {
        Some(path) if path.is_file() => println!("✓ cookies: {:?}", path),
        Some(path) => println!("✗ cookies: {:?} does not exist", path),
        None => println!("- cookies: not configured"),
    }

    println!();
    println!("Credentials:");
    if has_credentials(config) {
        println!("✓ Spotify client credentials: set");
    } else {
        println!("✗ Spotify client credentials: not set");
        println!("  Create an app at: https://developer.spotify.com/dashboard");
    }

    println!();
    match config.validate() {
        Ok(()) => println!("✓ Configuration valid"),
        Err(e) => println!("✗ {}", e),
    }

    Ok(())
}

/// Write the default config to `path` or the default location
pub fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
    };
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    config::save_to(&path, &Config::default())?;
    println!("Wrote default config to {:?}", path);
    Ok(())
}
