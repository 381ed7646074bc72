//! Library import: handing acquired files to a music library application.
//!
//! The pipeline only sees the [`LibraryImport`] trait. [`AppleMusicLibrary`]
//! drives the macOS Music app through `osascript`; [`NoLibrary`] is used
//! everywhere else. Every call runs under a timeout and failures are soft:
//! a file that could not be imported is still a valid acquisition.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BackendError, LibraryImport};
use crate::config::{ImportTarget, LibraryConfig, MatchBy};

/// Build the importer selected in config.
pub fn from_config(config: &LibraryConfig) -> Box<dyn LibraryImport> {
    match config.import {
        ImportTarget::None => Box::new(NoLibrary),
        ImportTarget::AppleMusic => Box::new(AppleMusicLibrary::new(
            config.match_by,
            Duration::from_secs(config.timeout_secs.max(1)),
        )),
    }
}

/// What happened when a file was offered to the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Added,
    AlreadyPresent,
    Failed(String),
}

/// Add `path` unless the library already has it. Never fails.
pub async fn import_if_new(
    library: &dyn LibraryImport,
    path: &Path,
    artist: &str,
    title: &str,
) -> ImportOutcome {
    let result = async {
        if library.contains(path, artist, title).await? {
            return Ok(ImportOutcome::AlreadyPresent);
        }
        library.add(path).await?;
        Ok::<_, BackendError>(ImportOutcome::Added)
    }
    .await;

    match result {
        Ok(ImportOutcome::Added) => {
            tracing::info!("Added to library: {:?}", path.file_name().unwrap_or_default());
            ImportOutcome::Added
        }
        Ok(outcome) => {
            tracing::debug!("Already in library: {:?}", path);
            outcome
        }
        Err(e) => {
            tracing::warn!("Library import failed for {:?}: {}", path, e);
            ImportOutcome::Failed(e.to_string())
        }
    }
}

/// No library integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibrary;

#[async_trait]
impl LibraryImport for NoLibrary {
    async fn contains(&self, _path: &Path, _artist: &str, _title: &str) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn add(&self, _path: &Path) -> Result<(), BackendError> {
        Ok(())
    }
}

/// The macOS Music app, scripted through `osascript`.
#[derive(Debug, Clone)]
pub struct AppleMusicLibrary {
    match_by: MatchBy,
    timeout: Duration,
}

impl AppleMusicLibrary {
    pub fn new(match_by: MatchBy, timeout: Duration) -> Self {
        Self { match_by, timeout }
    }

    fn contains_script(&self, path: &Path, artist: &str, title: &str) -> String {
        let filter = match self.match_by {
            MatchBy::Location => format!(
                "location is (POSIX file \"{}\")",
                escape(&absolute(path).to_string_lossy())
            ),
            MatchBy::Metadata => format!(
                "artist is \"{}\" and name is \"{}\"",
                escape(artist),
                escape(title)
            ),
        };
        format!(
            "tell application \"Music\"\n\
             \tset trackList to every track of library playlist 1 whose {}\n\
             \tif (count of trackList) > 0 then\n\
             \t\treturn \"YES\"\n\
             \telse\n\
             \t\treturn \"NO\"\n\
             \tend if\n\
             end tell",
            filter
        )
    }

    fn add_script(path: &Path) -> String {
        format!(
            "tell application \"Music\" to add POSIX file \"{}\" to library playlist 1",
            escape(&absolute(path).to_string_lossy())
        )
    }

    async fn run(&self, script: String) -> Result<String, BackendError> {
        let mut command = tokio::process::Command::new("osascript");
        command.arg("-e").arg(script).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(BackendError::Timeout(self.timeout.as_secs())),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::ToolMissing("osascript".to_string()));
            }
            Ok(Err(e)) => return Err(BackendError::Transient(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(BackendError::Transient(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl LibraryImport for AppleMusicLibrary {
    async fn contains(&self, path: &Path, artist: &str, title: &str) -> Result<bool, BackendError> {
        let answer = self.run(self.contains_script(path, artist, title)).await?;
        Ok(answer == "YES")
    }

    async fn add(&self, path: &Path) -> Result<(), BackendError> {
        self.run(Self::add_script(path)).await.map(|_| ())
    }
}

/// Escape a value for an AppleScript string literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
