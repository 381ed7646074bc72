//! File layout for acquired tracks.
//!
//! Files live at `<save_dir>/<Artist>/<Title>.<ext>`, with reserved
//! filesystem characters replaced before joining. Also provides the
//! folder-cleanup pass that drops unreadable or out-of-bounds files left
//! behind by earlier runs.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::backend::DurationProbe;
use crate::model::DurationBounds;

/// Extensions treated as audio when walking a folder.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "ogg", "opus", "wav"];

/// Legacy single-file naming: `Artist - Title.ext`.
const LEGACY_SEPARATOR: &str = " - ";

/// Sanitizes a filename by replacing reserved characters with '-'.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Final path for a track: `<save_dir>/<Artist>/<Title>.<ext>`.
pub fn target_path(save_dir: &Path, artist: &str, title: &str, ext: &str) -> PathBuf {
    let artist = non_empty_or(sanitize_filename(artist), "Unknown Artist");
    let title = non_empty_or(sanitize_filename(title), "Unknown Title");
    save_dir.join(artist).join(format!("{}.{}", title, ext))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    // A bare "." or ".." would escape the artist directory
    if value.is_empty() || value.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        value
    }
}

/// Check if a path has an audio file extension
pub fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    ext.is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Audio files under `root`, sorted by path.
pub fn audio_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_audio_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Recover (artist, title) from a file's location under `root`.
///
/// `Artist/Title.ext` yields the folder name and stem; a legacy
/// `Artist - Title.ext` directly under `root` is split on the separator.
/// Returns `None` when no artist can be derived.
pub fn parse_artist_title(path: &Path, root: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_string_lossy().trim().to_string();
    let parent = path.parent()?;

    if parent == root {
        let (artist, title) = stem.split_once(LEGACY_SEPARATOR)?;
        let (artist, title) = (artist.trim(), title.trim());
        if artist.is_empty() || title.is_empty() {
            return None;
        }
        return Some((artist.to_string(), title.to_string()));
    }

    let artist = parent.file_name()?.to_string_lossy().trim().to_string();
    if artist.is_empty() || stem.is_empty() {
        return None;
    }
    Some((artist, stem))
}

/// Outcome of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Files that passed the duration check
    pub kept: Vec<PathBuf>,
    /// Deleted files with their measured duration (0 = unreadable)
    pub removed: Vec<(PathBuf, u32)>,
    /// Files that should have been removed but could not be
    pub failed: Vec<PathBuf>,
}

/// Delete audio files under `root` that are unreadable or out of bounds.
pub fn clean_folder(root: &Path, bounds: DurationBounds, probe: &dyn DurationProbe) -> CleanReport {
    let mut report = CleanReport::default();
    for path in audio_files(root) {
        let seconds = probe.probe_duration(&path);
        if bounds.contains(seconds) {
            report.kept.push(path);
            continue;
        }

        tracing::info!("Removing unreadable/out-of-range file ({}s): {:?}", seconds, path);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(parent) = path.parent().filter(|p| *p != root) {
                    let _ = remove_empty_dirs(parent, root);
                }
                report.removed.push((path, seconds));
            }
            Err(e) => {
                tracing::warn!("Failed to remove {:?}: {}", path, e);
                report.failed.push(path);
            }
        }
    }
    report
}

/// Removes empty directories up the tree, stopping at `root`
fn remove_empty_dirs(path: &Path, root: &Path) -> std::io::Result<()> {
    if path != root && path.starts_with(root) && path.is_dir() && fs::read_dir(path)?.next().is_none()
    {
        fs::remove_dir(path)?;
        if let Some(parent) = path.parent() {
            let _ = remove_empty_dirs(parent, root);
        }
    }
    Ok(())
}
