//! Pipeline driver.
//!
//! Owns one run's context: the loaded dedup index, its log path, the
//! planner and ranker built from config, and the injected collaborators.
//! For each reference it decides whether to skip, adopt an existing file or
//! run the acquisition engine, then tags, imports and records accepted
//! files. Nothing that happens to one reference aborts the batch.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::acquisition::{AcquisitionEngine, AcquisitionPolicy, CancelToken, Resolution};
use crate::backend::{DownloadBackend, DurationProbe, LibraryImport, SearchBackend, TagWriter};
use crate::canonical::{self, CanonicalKey};
use crate::config::{Config, ConfigError};
use crate::dedup::{DedupError, DedupIndex};
use crate::error::Error;
use crate::library::{self, ImportOutcome};
use crate::model::{AcquiredFile, RankedCandidate, TrackReference};
use crate::organizer;
use crate::planner::QueryPlanner;
use crate::ranker::CandidateRanker;
use crate::verify::{self, Verdict};

/// External services the driver talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub search: &'a dyn SearchBackend,
    pub downloader: &'a dyn DownloadBackend,
    pub probe: &'a dyn DurationProbe,
    pub tagger: &'a dyn TagWriter,
    pub library: &'a dyn LibraryImport,
}

/// Why a reference was not acquired this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The index already holds an equivalent key
    AlreadyIndexed,
    /// The catalog's duration hint is outside the bounds
    DurationHintOutOfBounds(u32),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyIndexed => write!(f, "already downloaded"),
            Self::DurationHintOutOfBounds(secs) => write!(f, "catalog duration {}s out of bounds", secs),
        }
    }
}

/// What happened to one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Acquired {
        file: AcquiredFile,
        attempts: usize,
        /// The file was already on disk and only had to be verified
        adopted: bool,
    },
    Skipped(SkipReason),
    Exhausted { attempts: usize },
    /// Not processed, or interrupted, because the run was cancelled
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TrackResult {
    pub reference: TrackReference,
    pub outcome: TrackOutcome,
}

/// Summary of a batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<TrackResult>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&TrackOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn acquired(&self) -> usize {
        self.count(|o| matches!(o, TrackOutcome::Acquired { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TrackOutcome::Skipped(_)))
    }

    pub fn exhausted(&self) -> usize {
        self.count(|o| matches!(o, TrackOutcome::Exhausted { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, TrackOutcome::Cancelled))
    }

    /// References that could not be satisfied, as errors.
    pub fn errors(&self) -> Vec<Error> {
        self.results
            .iter()
            .filter_map(|r| match r.outcome {
                TrackOutcome::Exhausted { attempts } => Some(Error::exhausted(&r.reference, attempts)),
                _ => None,
            })
            .collect()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} acquired, {} skipped, {} not found, {} cancelled in {}s",
            self.acquired(),
            self.skipped(),
            self.exhausted(),
            self.cancelled(),
            self.elapsed().num_seconds()
        )
    }
}

/// Queries and ranked candidates for one reference, without downloading.
#[derive(Debug, Clone)]
pub struct Preview {
    pub queries: Vec<String>,
    /// The query whose results are shown, if any produced candidates
    pub query: Option<String>,
    pub ranked: Vec<RankedCandidate>,
}

/// Settings copied out of [`Config`] for the driver.
#[derive(Debug, Clone)]
struct Settings {
    save_dir: PathBuf,
    genre: String,
    audio_format: String,
    log_path: PathBuf,
}

/// One run's context.
pub struct Pipeline<'a> {
    settings: Settings,
    planner: QueryPlanner,
    ranker: CandidateRanker,
    policy: AcquisitionPolicy,
    index: DedupIndex,
    collaborators: Collaborators<'a>,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &Config,
        index: DedupIndex,
        collaborators: Collaborators<'a>,
        cancel: CancelToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            settings: Settings {
                save_dir: config.profile.save_dir.clone(),
                genre: config.profile.genre.clone(),
                audio_format: config.download.audio_format.clone(),
                log_path: config.log_path(),
            },
            planner: QueryPlanner::new(&config.query),
            ranker: CandidateRanker::new(&config.filter)?,
            policy: AcquisitionPolicy::from_config(config),
            index,
            collaborators,
            cancel,
        })
    }

    pub fn index(&self) -> &DedupIndex {
        &self.index
    }

    pub fn into_index(self) -> DedupIndex {
        self.index
    }

    /// Persist the index to its log.
    pub fn flush(&self) -> Result<(), DedupError> {
        self.index.flush(&self.settings.log_path)
    }

    /// Where `reference` is stored once acquired.
    pub fn target_path(&self, reference: &TrackReference) -> PathBuf {
        organizer::target_path(
            &self.settings.save_dir,
            &reference.artist,
            &canonical::normalize_remaster_title(&reference.title),
            &self.settings.audio_format,
        )
    }

    /// Process every reference in order, reporting each outcome to `progress`.
    ///
    /// Once cancelled, the remaining references are reported as
    /// [`TrackOutcome::Cancelled`] without being touched.
    pub async fn run_batch(
        &mut self,
        references: &[TrackReference],
        mut progress: impl FnMut(&TrackReference, &TrackOutcome),
    ) -> BatchReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(references.len());

        for reference in references {
            let outcome = if self.cancel.is_cancelled() {
                TrackOutcome::Cancelled
            } else {
                self.process(reference).await
            };
            progress(reference, &outcome);
            results.push(TrackResult {
                reference: reference.clone(),
                outcome,
            });
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            results,
        };
        tracing::info!("Batch finished: {}", report);
        report
    }

    /// Resolve a single reference.
    pub async fn process(&mut self, reference: &TrackReference) -> TrackOutcome {
        let key = CanonicalKey::of(reference);
        if self.index.contains_key(&key) {
            if self.indexed_file_missing(reference) {
                tracing::warn!(
                    "Indexed but missing on disk, skipping anyway: {} ({:?})",
                    reference,
                    self.target_path(reference)
                );
            } else {
                tracing::info!("Skipping (already downloaded): {}", reference);
            }
            return TrackOutcome::Skipped(SkipReason::AlreadyIndexed);
        }

        if let Some(hint) = reference.duration_hint_seconds
            && !self.policy.bounds.contains(hint)
        {
            tracing::info!("Skipping (duration {}s): {}", hint, reference);
            return TrackOutcome::Skipped(SkipReason::DurationHintOutOfBounds(hint));
        }

        let target = self.target_path(reference);
        if let Some(file) = self.adopt_existing(reference, &target) {
            self.finish(reference, key, &file).await;
            return TrackOutcome::Acquired {
                file,
                attempts: 0,
                adopted: true,
            };
        }

        let resolution = {
            let engine = AcquisitionEngine {
                planner: &self.planner,
                ranker: &self.ranker,
                search: self.collaborators.search,
                downloader: self.collaborators.downloader,
                probe: self.collaborators.probe,
                policy: &self.policy,
                cancel: &self.cancel,
            };
            engine.resolve(reference, &target).await
        };

        match resolution {
            Resolution::Accepted { file, attempts } => {
                tracing::info!(
                    "Downloaded {} ({}s, {} attempts)",
                    reference,
                    file.measured_duration_seconds,
                    attempts
                );
                self.finish(reference, key, &file).await;
                TrackOutcome::Acquired {
                    file,
                    attempts,
                    adopted: false,
                }
            }
            Resolution::Exhausted { attempts } => {
                tracing::info!("No suitable version found: {}", reference);
                TrackOutcome::Exhausted { attempts }
            }
            Resolution::Cancelled { attempts } => {
                tracing::info!("Cancelled after {} attempts: {}", attempts, reference);
                TrackOutcome::Cancelled
            }
        }
    }

    /// Plan and rank without downloading.
    ///
    /// Searches query variants in order and stops at the first one with
    /// surviving candidates.
    pub async fn preview(&self, reference: &TrackReference) -> Preview {
        let queries = self.planner.plan_queries(reference);
        for query in &queries {
            match self
                .collaborators
                .search
                .search(query, self.policy.search_results)
                .await
            {
                Ok(results) => {
                    let ranked = self.ranker.rank(&results, reference, self.policy.bounds);
                    if !ranked.is_empty() {
                        return Preview {
                            query: Some(query.clone()),
                            ranked,
                            queries,
                        };
                    }
                }
                Err(e) => tracing::warn!("Search failed for {:?}: {}", query, e),
            }
        }
        Preview {
            queries,
            query: None,
            ranked: Vec::new(),
        }
    }

    /// A file already at `target` that the index does not know about.
    ///
    /// Verified files are adopted; anything else is deleted so acquisition
    /// can replace it.
    /// True when `reference` is indexed but its target file is gone.
    fn indexed_file_missing(&self, reference: &TrackReference) -> bool {
        self.index.contains_key(&CanonicalKey::of(reference)) && !self.target_path(reference).exists()
    }

    fn adopt_existing(&self, reference: &TrackReference, target: &Path) -> Option<AcquiredFile> {
        if !target.exists() {
            return None;
        }
        tracing::warn!("File exists but is not indexed, verifying: {:?}", target);
        match verify::verify(target, self.policy.bounds, self.collaborators.probe) {
            Verdict::Accepted { seconds } => {
                tracing::info!("Adopting existing file for {} ({}s)", reference, seconds);
                Some(AcquiredFile {
                    path: target.to_path_buf(),
                    measured_duration_seconds: seconds,
                })
            }
            Verdict::Rejected(reason) => {
                tracing::info!("Existing file {:?} rejected ({}), replacing", target, reason);
                verify::discard(target);
                None
            }
        }
    }

    /// Tag, import and record an accepted file.
    async fn finish(&mut self, reference: &TrackReference, key: CanonicalKey, file: &AcquiredFile) {
        let title = canonical::normalize_remaster_title(&reference.title);
        if let Err(e) = self.collaborators.tagger.write_tags(
            &file.path,
            &self.settings.genre,
            &reference.artist,
            &title,
        ) {
            tracing::warn!("Tagging failed for {:?}: {}", file.path, e);
        }

        let outcome =
            library::import_if_new(self.collaborators.library, &file.path, &reference.artist, &title)
                .await;
        if let ImportOutcome::Failed(reason) = outcome {
            tracing::debug!("Keeping {:?} despite import failure: {}", file.path, reason);
        }

        self.index.remember_key(key);
        if let Err(e) = self.flush() {
            tracing::warn!("Failed to persist index: {}", e);
        }
    }
}
