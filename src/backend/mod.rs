//! Collaborator interfaces consumed by the acquisition engine.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses [`ytdlp::YtDlp`] for search and download, the
//! `lofty` probe/tagger from [`crate::metadata`] and a library importer
//! from [`crate::library`]; tests substitute the scripted implementations
//! in [`mocks`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::model::{FallbackTier, SearchCandidate};

pub mod ytdlp;

pub use ytdlp::YtDlp;

/// Failure of a search, download or import call.
///
/// Download failures are classified so the state machine can decide
/// between escalating the fallback tier and moving to the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Requested format not available: {0}")]
    FormatUnavailable(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("{0} not found on this system")]
    ToolMissing(String),

    #[error("Failed to parse backend output: {0}")]
    Parse(String),
}

impl BackendError {
    /// Classify a failure from the downloader's error text.
    pub fn classify(message: &str) -> Self {
        let message = message.trim();
        let summary = last_error_line(message).to_string();
        if message.contains("Requested format is not available") {
            Self::FormatUnavailable(summary)
        } else if message.contains("HTTP Error 403") || message.contains("Sign in to confirm") {
            Self::AccessDenied(summary)
        } else {
            Self::Transient(summary)
        }
    }

    /// Whether the same candidate is worth retrying under the next tier.
    pub fn escalates_tier(&self) -> bool {
        matches!(self, Self::FormatUnavailable(_) | Self::AccessDenied(_))
    }
}

fn last_error_line(message: &str) -> &str {
    message
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| message.lines().last())
        .unwrap_or(message)
        .trim()
}

/// Search backend: one query in, candidates out.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchCandidate>, BackendError>;
}

/// Download backend.
///
/// `target` is the desired final path (`<dir>/<stem>.<ext>`); the backend
/// may choose another extension and returns the path it actually wrote.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    async fn download(
        &self,
        source_url: &str,
        target: &Path,
        tier: &FallbackTier,
    ) -> Result<PathBuf, BackendError>;
}

/// Measures the playable duration of a file. Returns 0 on any failure.
pub trait DurationProbe: Send + Sync {
    fn probe_duration(&self, path: &Path) -> u32;
}

/// Writes genre, artist and title tags. Callers treat failures as soft.
pub trait TagWriter: Send + Sync {
    fn write_tags(
        &self,
        path: &Path,
        genre: &str,
        artist: &str,
        title: &str,
    ) -> crate::error::Result<()>;
}

/// External music library the acquired files are handed to.
///
/// Implementations bound every call with a timeout; callers treat errors
/// as soft failures.
#[async_trait]
pub trait LibraryImport: Send + Sync {
    async fn contains(&self, path: &Path, artist: &str, title: &str) -> Result<bool, BackendError>;

    async fn add(&self, path: &Path) -> Result<(), BackendError>;
}

/// Scripted collaborators for tests.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Search backend answering from a fixed script.
    ///
    /// Unscripted queries return no results.
    #[derive(Default)]
    pub struct ScriptedSearch {
        script: HashMap<String, Result<Vec<SearchCandidate>, BackendError>>,
        fallback: Vec<SearchCandidate>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        pub fn new() -> Self {
            Self::default()
        }

        /// Return `candidates` for every query.
        pub fn always(candidates: Vec<SearchCandidate>) -> Self {
            Self {
                fallback: candidates,
                ..Self::default()
            }
        }

        pub fn on(mut self, query: &str, candidates: Vec<SearchCandidate>) -> Self {
            self.script.insert(query.to_string(), Ok(candidates));
            self
        }

        pub fn failing(mut self, query: &str, error: BackendError) -> Self {
            self.script.insert(query.to_string(), Err(error));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedSearch {
        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SearchCandidate>, BackendError> {
            self.calls.lock().unwrap().push(query.to_string());
            let result = self
                .script
                .get(query)
                .cloned()
                .unwrap_or_else(|| Ok(self.fallback.clone()));
            result.map(|mut candidates| {
                candidates.truncate(limit);
                candidates
            })
        }
    }

    /// What one scripted download call does.
    #[derive(Debug, Clone)]
    pub enum DownloadOutcome {
        /// Write a file whose body is the duration in seconds
        Write(u32),
        Fail(BackendError),
    }

    /// Download backend answering from a per-URL script.
    ///
    /// Each URL's outcomes are consumed in order; unscripted or used-up URLs
    /// fail transiently. Written files contain their duration as text, which
    /// [`FileDurationProbe`] reads back.
    #[derive(Default)]
    pub struct ScriptedDownloader {
        script: Mutex<HashMap<String, VecDeque<DownloadOutcome>>>,
        default_seconds: Option<u32>,
        calls: Mutex<Vec<(String, FallbackTier)>>,
    }

    impl ScriptedDownloader {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every download succeeds with a file of `seconds`.
        pub fn always(seconds: u32) -> Self {
            Self {
                default_seconds: Some(seconds),
                ..Self::default()
            }
        }

        pub fn on(self, url: &str, outcomes: Vec<DownloadOutcome>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(url.to_string(), outcomes.into());
            self
        }

        pub fn calls(&self) -> Vec<(String, FallbackTier)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DownloadBackend for ScriptedDownloader {
        async fn download(
            &self,
            source_url: &str,
            target: &Path,
            tier: &FallbackTier,
        ) -> Result<PathBuf, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((source_url.to_string(), tier.clone()));

            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(source_url)
                .and_then(|outcomes| outcomes.pop_front());
            let outcome = match (next, self.default_seconds) {
                (Some(outcome), _) => outcome,
                (None, Some(seconds)) => DownloadOutcome::Write(seconds),
                (None, None) => DownloadOutcome::Fail(BackendError::Transient(
                    "unscripted download".to_string(),
                )),
            };

            match outcome {
                DownloadOutcome::Write(seconds) => {
                    if let Some(dir) = target.parent() {
                        std::fs::create_dir_all(dir).unwrap();
                    }
                    std::fs::write(target, seconds.to_string()).unwrap();
                    Ok(target.to_path_buf())
                }
                DownloadOutcome::Fail(error) => Err(error),
            }
        }
    }

    /// Reads a file's body as its duration in seconds.
    pub struct FileDurationProbe;

    impl DurationProbe for FileDurationProbe {
        fn probe_duration(&self, path: &Path) -> u32 {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|body| body.trim().parse().ok())
                .unwrap_or(0)
        }
    }

    /// Records tag writes instead of touching the file.
    #[derive(Default)]
    pub struct RecordingTagWriter {
        pub writes: Mutex<Vec<(PathBuf, String, String, String)>>,
    }

    impl TagWriter for RecordingTagWriter {
        fn write_tags(
            &self,
            path: &Path,
            genre: &str,
            artist: &str,
            title: &str,
        ) -> crate::error::Result<()> {
            self.writes.lock().unwrap().push((
                path.to_path_buf(),
                genre.to_string(),
                artist.to_string(),
                title.to_string(),
            ));
            Ok(())
        }
    }

    /// In-memory library.
    #[derive(Default)]
    pub struct MockLibrary {
        pub added: Mutex<Vec<PathBuf>>,
        pub error: Option<BackendError>,
    }

    impl MockLibrary {
        pub fn with_error(error: BackendError) -> Self {
            Self {
                added: Mutex::default(),
                error: Some(error),
            }
        }
    }

    #[async_trait]
    impl LibraryImport for MockLibrary {
        async fn contains(
            &self,
            path: &Path,
            _artist: &str,
            _title: &str,
        ) -> Result<bool, BackendError> {
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            Ok(self.added.lock().unwrap().iter().any(|p| p == path))
        }

        async fn add(&self, path: &Path) -> Result<(), BackendError> {
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            self.added.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }
}
