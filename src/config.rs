//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tune-harvest\config.toml
//! - macOS: ~/Library/Application Support/tune-harvest/config.toml
//! - Linux: ~/.config/tune-harvest/config.toml
//!
//! Genre keywords, duration bounds, blocklists and fallback tiers all live
//! here as data. Every section is `#[serde(default)]` so a partial file is
//! enough to override one setting.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{DurationBounds, FallbackTier};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// What to fetch and where to put it
    pub profile: ProfileConfig,

    /// Accepted duration window
    pub duration: DurationConfig,

    /// Catalog search settings
    pub catalog: CatalogConfig,

    /// Query variant generation
    pub query: QueryConfig,

    /// Candidate filtering and scoring
    pub filter: FilterConfig,

    /// Download backend settings
    pub download: DownloadConfig,

    /// Dedup index persistence
    pub index: IndexConfig,

    /// Library import settings
    pub library: LibraryConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

/// Genre profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Genre tag written into every acquired file
    pub genre: String,

    /// Catalog search keyword
    pub keyword: String,

    /// Root directory; files land in `<save_dir>/<Artist>/<Title>.mp3`
    pub save_dir: PathBuf,

    /// Upper bound on references taken from the catalog
    pub max_tracks: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        let music_root = dirs::audio_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            genre: "Top 40".to_string(),
            keyword: "pop hits".to_string(),
            save_dir: music_root.join("Top 40"),
            max_tracks: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationConfig {
    pub min_seconds: u32,
    pub max_seconds: u32,

    /// Drop catalog entries whose reported duration is already out of bounds
    pub prefilter_catalog: bool,
}

impl Default for DurationConfig {
    fn default() -> Self {
        let bounds = DurationBounds::default();
        Self {
            min_seconds: bounds.min,
            max_seconds: bounds.max,
            prefilter_catalog: true,
        }
    }
}

impl DurationConfig {
    pub fn bounds(&self) -> DurationBounds {
        DurationBounds::new(self.min_seconds, self.max_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Number of playlists requested per keyword search
    pub playlist_limit: u32,

    /// Playlists whose name or description mention any of these are skipped
    pub exclude_playlist_keywords: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            playlist_limit: 20,
            exclude_playlist_keywords: strings(&[
                "k-pop", "rock", "edm", "rap", "hip hop", "r&b", "reggae", "trap", "jazz",
                "indie", "afro", "amapiano", "throwback", "oldies", "retro", "classic",
                "remix", "country", "metal", "acoustic", "instrumental", "lofi", "alt",
                "alternative", "underground", "covers", "workout", "party", "dance",
                "house", "emo", "punk", "folk", "soul", "afrobeats",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Suffixes tried before the bare query, in priority order
    pub precision_suffixes: Vec<String>,

    /// Clean-version markers tried first for explicit references
    pub clean_markers: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            precision_suffixes: strings(&["official audio", "- topic"]),
            clean_markers: strings(&[
                "clean",
                "radio edit",
                "no cursing",
                "clean version",
                "lyrics clean",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Tokens that disqualify a candidate when found in its title or channel
    pub blocklist: Vec<String>,

    /// Regex patterns marking long-form uploads (matched case-insensitively)
    pub longform_patterns: Vec<String>,

    /// URL fragments of short-form or clip pages
    pub short_form_url_markers: Vec<String>,

    /// Markers worth the official-audio bonus
    pub official_markers: Vec<String>,

    /// Suffix of auto-generated artist channels
    pub topic_marker: String,

    /// Label-distribution channel markers
    pub label_markers: Vec<String>,

    /// Also reject candidates that match neither the artist's channel nor the title
    pub strict_source_match: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blocklist: strings(&[
                "explicit", "dirty", "uncut", "nsfw", "raw", "live", "karaoke",
                "instrumental", "remix", "cover", "performance", "mix", "megamix",
                "dj set", "set", "continuous mix", "full album", "album", "compilation",
                "playlist", "shorts", "preview", "snippet", "sample", "sped up",
                "sped-up", "speed up", "nightcore", "8d", "tribute", "medley", "fanmade",
                "ai cover", "reimagined", "reworked", "piano version", "guitar cover",
                "drum cover", "lyrics video", "visualizer", "slowed", "slow + reverb",
                "mashup", "bootleg", "reverb", "loop",
            ]),
            longform_patterns: strings(&[
                r"\b\d{1,2}\s*(hour|hr|h)\b",
                r"\b\d{2,}\s*min\b",
                r"\b(best\s+of|nonstop|continuous)\b",
            ]),
            short_form_url_markers: strings(&["/shorts/", "/clip/"]),
            official_markers: strings(&["official audio"]),
            topic_marker: "topic".to_string(),
            label_markers: strings(&["vevo"]),
            strict_source_match: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Downloader executable
    pub binary: String,

    /// Directory or path of the ffmpeg executable (looked up on PATH when unset)
    pub ffmpeg_location: Option<PathBuf>,

    /// Exported browser cookies (Netscape format)
    pub cookies_file: Option<PathBuf>,

    /// Results requested per search query
    pub search_results: usize,

    /// Low-level transport retries handled by the downloader itself
    pub retries: u32,

    /// Audio codec the downloader extracts to
    pub audio_format: String,

    /// Per-call timeout for search and download
    pub timeout_secs: u64,

    /// Hard cap on download attempts per reference
    pub max_attempts_per_track: usize,

    /// Format/client fallback tiers, most compatible first
    pub tiers: Vec<FallbackTier>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            ffmpeg_location: None,
            cookies_file: None,
            search_results: 25,
            retries: 15,
            audio_format: "mp3".to_string(),
            timeout_secs: 300,
            max_attempts_per_track: 30,
            tiers: vec![
                FallbackTier::new("bestaudio[ext=m4a]/bestaudio/best", "android_music"),
                FallbackTier::new("bestaudio/best", "android"),
                FallbackTier::new("bestaudio/best", "web"),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Persisted log; defaults to `<save_dir>/downloaded_tracks.json`
    pub log_path: Option<PathBuf>,

    /// Index verified files already in the save directory before fetching
    pub seed_from_library: bool,
}

/// Which library the acquired files are handed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTarget {
    #[default]
    None,
    AppleMusic,
}

/// How a library decides a file is already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBy {
    #[default]
    Location,
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub import: ImportTarget,
    pub match_by: MatchBy,
    pub timeout_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            import: ImportTarget::None,
            match_by: MatchBy::Location,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Resolved location of the persisted dedup log.
    pub fn log_path(&self) -> PathBuf {
        self.index
            .log_path
            .clone()
            .unwrap_or_else(|| self.profile.save_dir.join("downloaded_tracks.json"))
    }

    /// Check values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = self.duration.bounds();
        if bounds.min == 0 || bounds.min > bounds.max {
            return Err(ConfigError::Invalid(format!(
                "duration bounds {} are empty or start at zero",
                bounds
            )));
        }
        if self.download.tiers.is_empty() {
            return Err(ConfigError::Invalid(
                "download.tiers must list at least one fallback tier".to_string(),
            ));
        }
        if self.download.search_results == 0 {
            return Err(ConfigError::Invalid(
                "download.search_results must be positive".to_string(),
            ));
        }
        if self.download.max_attempts_per_track == 0 {
            return Err(ConfigError::Invalid(
                "download.max_attempts_per_track must be positive".to_string(),
            ));
        }
        for pattern in &self.filter.longform_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("longform pattern {:?}: {}", pattern, e)))?;
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tune-harvest"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit file.
///
/// Unlike [`load`], a missing or malformed file is an error.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(&path, config)?;
    Ok(path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
