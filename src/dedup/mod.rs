//! Dedup index: the set of canonical keys already acquired.
//!
//! The index is an in-memory `HashSet` backed by a flat JSON array of
//! strings on disk. The log is rewritten wholesale on every flush (temp
//! file + rename), so a crash mid-write leaves the previous log intact.
//!
//! A key only enters the index after its file passed verification; seeding
//! from an existing library folder follows the same rule.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::backend::DurationProbe;
use crate::canonical::{self, CanonicalKey};
use crate::model::{DurationBounds, TrackReference};
use crate::{metadata, organizer};

/// Separator used by older logs that stored raw `Artist::Title` pairs.
const LEGACY_SEPARATOR: &str = "::";

/// Errors writing the persisted log.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to create log directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to write index log {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

/// Process-wide set of acquired canonical keys.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    keys: HashSet<CanonicalKey>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether an equivalent reference was already acquired.
    pub fn contains(&self, reference: &TrackReference) -> bool {
        self.contains_key(&CanonicalKey::of(reference))
    }

    pub fn contains_key(&self, key: &CanonicalKey) -> bool {
        self.keys.contains(key)
    }

    /// Record a reference. Returns `false` if it was already present.
    pub fn remember(&mut self, reference: &TrackReference) -> bool {
        self.remember_key(CanonicalKey::of(reference))
    }

    pub fn remember_key(&mut self, key: CanonicalKey) -> bool {
        self.keys.insert(key)
    }

    /// Keys in sorted order.
    pub fn sorted_keys(&self) -> Vec<&CanonicalKey> {
        let mut keys: Vec<_> = self.keys.iter().collect();
        keys.sort();
        keys
    }

    /// Load the persisted log.
    ///
    /// A missing, empty or corrupt log yields an empty index. Entries in the
    /// legacy `Artist::Title` form are re-canonicalized.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No index log at {:?}, starting empty", path);
                return Self::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read index log {:?}: {}, starting empty", path, e);
                return Self::new();
            }
        };

        if contents.trim().is_empty() {
            return Self::new();
        }

        let entries: Vec<String> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Index log {:?} is corrupt ({}), starting empty", path, e);
                return Self::new();
            }
        };

        let mut index = Self::new();
        for entry in entries {
            let key = parse_entry(&entry);
            if !key.is_empty() {
                index.keys.insert(key);
            }
        }
        tracing::info!("Loaded {} keys from {:?}", index.len(), path);
        index
    }

    /// Rewrite the persisted log with the current contents.
    pub fn flush(&self, path: &Path) -> Result<(), DedupError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| DedupError::CreateDir(dir.to_path_buf(), e))?;
        }

        let entries: Vec<&str> = self.sorted_keys().into_iter().map(|k| k.as_str()).collect();
        let contents = serde_json::to_string_pretty(&entries)?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(|e| DedupError::Write(temp_path.clone(), e))?;
        std::fs::rename(&temp_path, path)
            .map_err(|e| DedupError::Rename(temp_path, path.to_path_buf(), e))?;

        tracing::debug!("Flushed {} keys to {:?}", self.len(), path);
        Ok(())
    }

    /// Index audio files already present under `root`.
    ///
    /// Artist and title come from embedded tags, falling back to the folder
    /// layout. Files whose duration is unreadable or out of bounds are not
    /// indexed. Returns the number of new keys.
    pub fn seed_from_library(
        &mut self,
        root: &Path,
        bounds: DurationBounds,
        probe: &dyn DurationProbe,
    ) -> usize {
        let mut added = 0;
        for path in organizer::audio_files(root) {
            let seconds = probe.probe_duration(&path);
            if !bounds.contains(seconds) {
                tracing::debug!("Not indexing {:?} ({}s outside {})", path, seconds, bounds);
                continue;
            }

            let from_tags = metadata::read_artist_title(&path);
            let from_path = organizer::parse_artist_title(&path, root);
            let artist = from_tags
                .as_ref()
                .and_then(|(a, _)| a.clone())
                .or_else(|| from_path.as_ref().map(|(a, _)| a.clone()));
            let title = from_tags
                .and_then(|(_, t)| t)
                .or_else(|| from_path.map(|(_, t)| t));

            if let (Some(artist), Some(title)) = (artist, title) {
                let key = canonical::canonical_key(&artist, &title);
                if !key.is_empty() && self.remember_key(key) {
                    added += 1;
                }
            }
        }
        tracing::info!("Seeded {} keys from {:?}", added, root);
        added
    }
}

fn parse_entry(entry: &str) -> CanonicalKey {
    match entry.split_once(LEGACY_SEPARATOR) {
        Some((artist, title)) => canonical::canonical_key(artist, title),
        None => CanonicalKey::from_canonical(canonical::normalize(entry)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mocks::FileDurationProbe;

    #[test]
    fn test_remember_is_idempotent() {
        let mut index = DedupIndex::new();
        let reference = TrackReference::new("Fleetwood Mac", "Dreams");
        assert!(index.remember(&reference));
        assert!(!index.remember(&reference));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_contains_matches_formatting_variants() {
        let mut index = DedupIndex::new();
        index.remember(&TrackReference::new("Drake", "Take Care"));
        assert!(index.contains(&TrackReference::new(
            "Drake feat. Rihanna",
            "Take Care (Remastered 2016)"
        )));
        assert!(!index.contains(&TrackReference::new("Drake", "Hotline Bling")));
    }

    #[test]
    fn test_flush_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("downloaded.json");

        let mut index = DedupIndex::new();
        index.remember(&TrackReference::new("Fleetwood Mac", "Dreams"));
        index.remember(&TrackReference::new("ABBA", "Dancing Queen"));
        index.flush(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(entries, vec!["abbadancingqueen", "fleetwoodmacdreams"]);

        let loaded = DedupIndex::load(&path);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&TrackReference::new("Fleetwood Mac", "Dreams")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DedupIndex::load(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn test_load_empty_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "  \n").unwrap();
        assert!(DedupIndex::load(&path).is_empty());
    }

    #[test]
    fn test_load_corrupt_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "[\"fleetwoodmacdreams\", ").unwrap();
        assert!(DedupIndex::load(&path).is_empty());

        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(DedupIndex::load(&path).is_empty());
    }

    #[test]
    fn test_load_recanonicalizes_legacy_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(
            &path,
            r#"["Fleetwood Mac::Dreams - 2004 Remaster", "abbadancingqueen"]"#,
        )
        .unwrap();

        let index = DedupIndex::load(&path);
        assert_eq!(index.len(), 2);
        assert!(index.contains(&TrackReference::new("Fleetwood Mac", "Dreams")));
        assert!(index.contains(&TrackReference::new("ABBA", "Dancing Queen")));
    }

    #[test]
    fn test_seed_only_indexes_in_bounds_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Fleetwood Mac")).unwrap();
        std::fs::create_dir_all(root.join("ABBA")).unwrap();
        // The mock probe reads the duration from the file body
        std::fs::write(root.join("Fleetwood Mac").join("Dreams.mp3"), "257").unwrap();
        std::fs::write(root.join("ABBA").join("Waterloo.mp3"), "30").unwrap();

        let mut index = DedupIndex::new();
        let added = index.seed_from_library(root, DurationBounds::new(153, 720), &FileDurationProbe);

        assert_eq!(added, 1);
        assert!(index.contains(&TrackReference::new("Fleetwood Mac", "Dreams")));
        assert!(!index.contains(&TrackReference::new("ABBA", "Waterloo")));
    }
}
