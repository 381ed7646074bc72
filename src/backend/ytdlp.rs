//! Search and download through the `yt-dlp` command-line tool.
//!
//! Shelling out keeps the heavy lifting (extractors, signature handling,
//! ffmpeg post-processing) in the tool itself. Transport-level retries are
//! delegated to it via `--retries` / `--fragment-retries`; the state machine
//! only retries at candidate granularity.
//!
//! Install:
//! - macOS: `brew install yt-dlp ffmpeg`
//! - Linux: `pipx install yt-dlp` and the distribution's ffmpeg package
//! - Windows: `winget install yt-dlp.yt-dlp Gyan.FFmpeg`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{BackendError, DownloadBackend, SearchBackend};
use crate::config::DownloadConfig;
use crate::model::{FallbackTier, SearchCandidate};

/// `yt-dlp` invocation settings.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    ffmpeg_location: Option<PathBuf>,
    cookies_file: Option<PathBuf>,
    retries: u32,
    audio_format: String,
    timeout: Duration,
}

/// One line of `yt-dlp --dump-json` output. Only the fields we read.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    is_live: Option<bool>,
    #[serde(default)]
    live_status: Option<String>,
}

impl From<VideoInfo> for SearchCandidate {
    fn from(info: VideoInfo) -> Self {
        let is_live = info.is_live.unwrap_or(false)
            || matches!(info.live_status.as_deref(), Some("is_live" | "is_upcoming"));
        Self {
            title: info.title.unwrap_or_default(),
            channel: info.channel.unwrap_or_default(),
            uploader: info.uploader.unwrap_or_default(),
            duration_seconds: info
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(|d| d.round() as u32)
                .unwrap_or(0),
            source_url: info.webpage_url.unwrap_or_default(),
            is_live,
        }
    }
}

impl YtDlp {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            ffmpeg_location: config.ffmpeg_location.clone(),
            cookies_file: config.cookies_file.clone(),
            retries: config.retries,
            audio_format: config.audio_format.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// Version string, or `None` when the binary is not runnable.
    pub async fn version(&self) -> Option<String> {
        tool_version(&self.binary, "--version").await
    }

    fn common_args(&self, args: &mut Vec<OsString>) {
        args.push("--no-warnings".into());
        args.push("--geo-bypass".into());
        args.push("--add-header".into());
        args.push("Accept-Language:en-US,en;q=0.9".into());
        if let Some(ref cookies) = self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
    }

    fn download_args(&self, source_url: &str, target: &Path, tier: &FallbackTier) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        self.common_args(&mut args);
        args.push("--format".into());
        args.push((&tier.format).into());
        args.push("--extractor-args".into());
        args.push(format!("youtube:player_client={}", tier.client).into());
        args.push("--extract-audio".into());
        args.push("--audio-format".into());
        args.push((&self.audio_format).into());
        args.push("--audio-quality".into());
        args.push("0".into());
        args.push("--output".into());
        args.push(output_template(target).into());
        args.push("--no-playlist".into());
        args.push("--force-overwrites".into());
        args.push("--no-progress".into());
        args.push("--retries".into());
        args.push(self.retries.to_string().into());
        args.push("--fragment-retries".into());
        args.push(self.retries.to_string().into());
        if let Some(ref ffmpeg) = self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.into());
        }
        args.push("--".into());
        args.push(source_url.into());
        args
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Output, BackendError> {
        let mut command = tokio::process::Command::new(&self.binary);
        command.args(&args).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => Err(BackendError::Timeout(self.timeout.as_secs())),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::ToolMissing(self.binary.clone()))
            }
            Ok(Err(e)) => Err(BackendError::Transient(format!(
                "failed to run {}: {}",
                self.binary, e
            ))),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

#[async_trait]
impl SearchBackend for YtDlp {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchCandidate>, BackendError> {
        let mut args: Vec<OsString> = Vec::new();
        self.common_args(&mut args);
        args.push("--dump-json".into());
        args.push("--skip-download".into());
        args.push("--ignore-errors".into());
        args.push(format!("ytsearch{}:{}", limit.max(1), query).into());

        let output = self.run(args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            return Err(BackendError::classify(&String::from_utf8_lossy(&output.stderr)));
        }
        Ok(parse_search_output(&stdout))
    }
}

#[async_trait]
impl DownloadBackend for YtDlp {
    async fn download(
        &self,
        source_url: &str,
        target: &Path,
        tier: &FallbackTier,
    ) -> Result<PathBuf, BackendError> {
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| BackendError::Transient(format!("creating {:?}: {}", dir, e)))?;
        }

        let output = self.run(self.download_args(source_url, target, tier)).await?;
        if !output.status.success() {
            return Err(BackendError::classify(&String::from_utf8_lossy(&output.stderr)));
        }

        locate_output(target, &self.audio_format).ok_or_else(|| {
            BackendError::Transient(format!("no output file for {:?}", target))
        })
    }
}

/// `<dir>/<stem>.%(ext)s`; the stem may itself contain dots.
fn output_template(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    target
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{}.%(ext)s", stem))
}

/// Find the file a download produced: the expected extension first, else
/// the most recently modified `<stem>.*` sibling.
fn locate_output(target: &Path, audio_format: &str) -> Option<PathBuf> {
    let stem = target.file_stem()?.to_string_lossy().into_owned();
    let dir = target.parent()?;
    let expected = dir.join(format!("{}.{}", stem, audio_format));
    if expected.is_file() {
        return Some(expected);
    }

    let prefix = format!("{}.", stem);
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl")
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Parse `--dump-json` output, one JSON object per line.
fn parse_search_output(stdout: &str) -> Vec<SearchCandidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<VideoInfo>(line) {
            Ok(info) => Some(SearchCandidate::from(info)),
            Err(e) => {
                tracing::debug!("Skipping unparsable search entry: {}", e);
                None
            }
        })
        .filter(|candidate| !candidate.source_url.is_empty())
        .collect()
}

/// How long a `--version` style call may take before the tool counts as unusable.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `binary arg` and return the first line of its output on success.
pub async fn tool_version(binary: impl AsRef<std::ffi::OsStr>, arg: &str) -> Option<String> {
    let mut command = tokio::process::Command::new(binary);
    command.arg(arg).kill_on_drop(true);

    let output = match tokio::time::timeout(VERSION_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(_)) | Ok(Err(_)) => return None,
        Err(_) => {
            tracing::warn!("Timed out after {}s asking for a tool version", VERSION_TIMEOUT.as_secs());
            return None;
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

/// Version of the ffmpeg that `yt-dlp` will use.
pub async fn ffmpeg_version(location: Option<&Path>) -> Option<String> {
    let binary = match location {
        Some(path) if path.is_dir() => path.join("ffmpeg"),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from("ffmpeg"),
    };
    tool_version(binary, "-version").await
}
