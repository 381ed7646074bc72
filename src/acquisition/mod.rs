//! Acquisition state machine.
//!
//! Drives query variants × ranked candidates × fallback tiers through the
//! download backend until one file passes verification or every option is
//! spent:
//!
//! ```text
//! Planning -> Searching(q) -> Ranking -> Attempting(c, t) -> Verifying
//!                 ^   |          |           |    ^              |
//!                 |   +- error --+- empty    |    +- escalate ---+
//!                 +------------------------ Retry <--------------+-> Accepted
//! ```
//!
//! Format-unavailable and access-denied failures escalate to the next tier
//! for the same candidate; anything else moves on to the next candidate.
//! Each candidate starts again at tier 0. A source URL is downloaded at most
//! once per resolution, even when several query variants return it, and
//! total download attempts are capped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{DownloadBackend, DurationProbe, SearchBackend};
use crate::config::Config;
use crate::model::{AcquiredFile, DurationBounds, FallbackTier, RankedCandidate, SearchCandidate, TrackReference};
use crate::planner::QueryPlanner;
use crate::ranker::CandidateRanker;
use crate::verify::{self, Verdict};

/// Shared cancellation flag, checked between state transitions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits and tiers for one run.
#[derive(Debug, Clone)]
pub struct AcquisitionPolicy {
    pub bounds: DurationBounds,
    pub search_results: usize,
    pub max_attempts_per_track: usize,
    pub tiers: Vec<FallbackTier>,
}

impl AcquisitionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bounds: config.duration.bounds(),
            search_results: config.download.search_results,
            max_attempts_per_track: config.download.max_attempts_per_track,
            tiers: config.download.tiers.clone(),
        }
    }

    /// Download attempts allowed for a plan of `queries` variants.
    pub fn attempt_cap(&self, queries: usize) -> usize {
        let cross_product = queries
            .saturating_mul(self.search_results)
            .saturating_mul(self.tiers.len());
        self.max_attempts_per_track.min(cross_product)
    }
}

/// Terminal outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Accepted { file: AcquiredFile, attempts: usize },
    Exhausted { attempts: usize },
    Cancelled { attempts: usize },
}

impl Resolution {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Accepted { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

#[derive(Debug)]
enum State {
    Planning,
    Searching { query: usize },
    Ranking { query: usize, results: Vec<SearchCandidate> },
    Attempting { query: usize, candidate: usize, tier: usize },
    Verifying { query: usize, candidate: usize, path: PathBuf },
    Retry { query: usize, candidate: usize },
    Accepted(AcquiredFile),
    Exhausted,
    Cancelled,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Searching { .. } => "searching",
            Self::Ranking { .. } => "ranking",
            Self::Attempting { .. } => "attempting",
            Self::Verifying { .. } => "verifying",
            Self::Retry { .. } => "retry",
            Self::Accepted(_) => "accepted",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted(_) | Self::Exhausted | Self::Cancelled)
    }
}

/// The collaborators one resolution needs.
pub struct AcquisitionEngine<'a> {
    pub planner: &'a QueryPlanner,
    pub ranker: &'a CandidateRanker,
    pub search: &'a dyn SearchBackend,
    pub downloader: &'a dyn DownloadBackend,
    pub probe: &'a dyn DurationProbe,
    pub policy: &'a AcquisitionPolicy,
    pub cancel: &'a CancelToken,
}

/// Per-resolution bookkeeping.
struct Resolver<'r> {
    reference: &'r TrackReference,
    target: &'r Path,
    queries: Vec<String>,
    ranked: Vec<RankedCandidate>,
    attempted_urls: HashSet<String>,
    attempts: usize,
    cap: usize,
}

impl AcquisitionEngine<'_> {
    /// Resolve `reference` into a verified file at (or next to) `target`.
    pub async fn resolve(&self, reference: &TrackReference, target: &Path) -> Resolution {
        let mut run = Resolver {
            reference,
            target,
            queries: Vec::new(),
            ranked: Vec::new(),
            attempted_urls: HashSet::new(),
            attempts: 0,
            cap: 0,
        };
        let mut state = State::Planning;

        loop {
            if self.cancel.is_cancelled() && !state.is_terminal() {
                // Never leave an unverified download behind
                if let State::Verifying { path, .. } = &state {
                    verify::discard(path);
                }
                state = State::Cancelled;
            }
            tracing::debug!(state = state.name(), "{}", reference);

            state = match state {
                State::Planning => {
                    run.queries = self.planner.plan_queries(reference);
                    run.cap = self.policy.attempt_cap(run.queries.len());
                    State::Searching { query: 0 }
                }
                State::Searching { query } => self.search(&run, query).await,
                State::Ranking { query, results } => {
                    run.ranked = self.ranker.rank(&results, reference, self.policy.bounds);
                    tracing::debug!(
                        "{} of {} candidates survived filtering for {:?}",
                        run.ranked.len(),
                        results.len(),
                        run.queries[query]
                    );
                    run.next_candidate(query, 0)
                }
                State::Attempting {
                    query,
                    candidate,
                    tier,
                } => self.attempt(&mut run, query, candidate, tier).await,
                State::Verifying {
                    query,
                    candidate,
                    path,
                } => match verify::verify(&path, self.policy.bounds, self.probe) {
                    Verdict::Accepted { seconds } => State::Accepted(AcquiredFile {
                        path,
                        measured_duration_seconds: seconds,
                    }),
                    Verdict::Rejected(reason) => {
                        tracing::info!("Rejected download for {}: {}", reference, reason);
                        verify::discard(&path);
                        State::Retry { query, candidate }
                    }
                },
                State::Retry { query, candidate } => run.next_candidate(query, candidate + 1),
                State::Accepted(file) => {
                    return Resolution::Accepted {
                        file,
                        attempts: run.attempts,
                    };
                }
                State::Exhausted => {
                    return Resolution::Exhausted {
                        attempts: run.attempts,
                    };
                }
                State::Cancelled => {
                    return Resolution::Cancelled {
                        attempts: run.attempts,
                    };
                }
            };
        }
    }

    async fn search(&self, run: &Resolver<'_>, query: usize) -> State {
        let Some(text) = run.queries.get(query) else {
            return State::Exhausted;
        };
        tracing::debug!("Searching: {}", text);
        match self.search.search(text, self.policy.search_results).await {
            Ok(results) => State::Ranking { query, results },
            Err(e) => {
                tracing::warn!("Search failed for {:?}: {}", text, e);
                State::Searching { query: query + 1 }
            }
        }
    }

    async fn attempt(&self, run: &mut Resolver<'_>, query: usize, candidate: usize, tier: usize) -> State {
        if run.attempts >= run.cap {
            tracing::info!("Attempt cap ({}) reached for {}", run.cap, run.reference);
            return State::Exhausted;
        }
        let (Some(ranked), Some(fallback)) = (run.ranked.get(candidate), self.policy.tiers.get(tier))
        else {
            return State::Retry { query, candidate };
        };

        let url = ranked.candidate.source_url.clone();
        run.attempts += 1;
        run.attempted_urls.insert(url.clone());
        tracing::info!(
            "Candidate: {} [{}s] / {} ({})",
            ranked.candidate.title,
            ranked.candidate.duration_seconds,
            ranked.candidate.channel,
            fallback
        );

        match self.downloader.download(&url, run.target, fallback).await {
            Ok(path) => State::Verifying {
                query,
                candidate,
                path,
            },
            Err(e) if e.escalates_tier() && tier + 1 < self.policy.tiers.len() => {
                tracing::debug!("{}; escalating to tier {}", e, tier + 1);
                State::Attempting {
                    query,
                    candidate,
                    tier: tier + 1,
                }
            }
            Err(e) => {
                tracing::debug!("Download failed, trying next candidate: {}", e);
                State::Retry { query, candidate }
            }
        }
    }
}

impl Resolver<'_> {
    /// First untried candidate at or after `from`, else the next query.
    fn next_candidate(&self, query: usize, from: usize) -> State {
        let next = (from..self.ranked.len())
            .find(|&j| !self.attempted_urls.contains(&self.ranked[j].candidate.source_url));
        match next {
            Some(candidate) => State::Attempting {
                query,
                candidate,
                tier: 0,
            },
            None => State::Searching { query: query + 1 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::mocks::{DownloadOutcome, FileDurationProbe, ScriptedDownloader, ScriptedSearch};
    use crate::config::{FilterConfig, QueryConfig};
    use crate::test_utils::{candidate, candidate_at};

    struct Fixture {
        planner: QueryPlanner,
        ranker: CandidateRanker,
        policy: AcquisitionPolicy,
        cancel: CancelToken,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                planner: QueryPlanner::new(&QueryConfig::default()),
                ranker: CandidateRanker::new(&FilterConfig::default()).unwrap(),
                policy: AcquisitionPolicy::from_config(&Config::default()),
                cancel: CancelToken::new(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn target(&self) -> PathBuf {
            self.dir.path().join("Fleetwood Mac").join("Dreams.mp3")
        }

        async fn resolve(&self, search: &ScriptedSearch, downloader: &dyn DownloadBackend) -> Resolution {
            let engine = AcquisitionEngine {
                planner: &self.planner,
                ranker: &self.ranker,
                search,
                downloader,
                probe: &FileDurationProbe,
                policy: &self.policy,
                cancel: &self.cancel,
            };
            engine
                .resolve(&TrackReference::new("Fleetwood Mac", "Dreams"), &self.target())
                .await
        }
    }

    fn tier(index: usize) -> FallbackTier {
        Config::default().download.tiers[index].clone()
    }

    #[tokio::test]
    async fn test_official_audio_accepted() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![candidate(
            "Fleetwood Mac - Dreams (Official Audio)",
            "Fleetwood Mac",
            257,
        )]);
        let downloader = ScriptedDownloader::always(257);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(
            resolution,
            Resolution::Accepted {
                file: AcquiredFile {
                    path: fx.target(),
                    measured_duration_seconds: 257,
                },
                attempts: 1,
            }
        );
        assert_eq!(search.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_format_unavailable_escalates_same_candidate() {
        let fx = Fixture::new();
        let c = candidate_at("https://yt/1", "Dreams", "Fleetwood Mac", 257);
        let search = ScriptedSearch::always(vec![c]);
        let downloader = ScriptedDownloader::new().on(
            "https://yt/1",
            vec![
                DownloadOutcome::Fail(BackendError::FormatUnavailable("fmt".into())),
                DownloadOutcome::Fail(BackendError::AccessDenied("403".into())),
                DownloadOutcome::Write(257),
            ],
        );

        let resolution = fx.resolve(&search, &downloader).await;
        assert!(matches!(resolution, Resolution::Accepted { attempts: 3, .. }));
        let calls = downloader.calls();
        assert_eq!(calls[0], ("https://yt/1".to_string(), tier(0)));
        assert_eq!(calls[1], ("https://yt/1".to_string(), tier(1)));
        assert_eq!(calls[2], ("https://yt/1".to_string(), tier(2)));
    }

    #[tokio::test]
    async fn test_transient_failure_moves_to_next_candidate_at_tier_zero() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![
            candidate_at("https://yt/1", "Dreams (Official Audio)", "Fleetwood Mac", 257),
            candidate_at("https://yt/2", "Dreams", "Fleetwood Mac", 257),
        ]);
        let downloader = ScriptedDownloader::new()
            .on(
                "https://yt/1",
                vec![
                    DownloadOutcome::Fail(BackendError::AccessDenied("403".into())),
                    DownloadOutcome::Fail(BackendError::Transient("reset".into())),
                ],
            )
            .on("https://yt/2", vec![DownloadOutcome::Write(257)]);

        let resolution = fx.resolve(&search, &downloader).await;
        assert!(matches!(resolution, Resolution::Accepted { attempts: 3, .. }));
        let calls = downloader.calls();
        assert_eq!(calls[1], ("https://yt/1".to_string(), tier(1)));
        assert_eq!(calls[2], ("https://yt/2".to_string(), tier(0)));
    }

    #[tokio::test]
    async fn test_escalation_stops_at_last_tier() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![candidate_at("https://yt/1", "Dreams", "Fleetwood Mac", 257)]);
        let denied = DownloadOutcome::Fail(BackendError::AccessDenied("403".into()));
        let downloader = ScriptedDownloader::new().on("https://yt/1", vec![denied.clone(), denied.clone(), denied]);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Exhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_verification_failure_deletes_and_retries() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![
            candidate_at("https://yt/1", "Dreams (Official Audio)", "Fleetwood Mac", 257),
            candidate_at("https://yt/2", "Dreams", "Fleetwood Mac", 257),
        ]);
        let downloader = ScriptedDownloader::new()
            .on("https://yt/1", vec![DownloadOutcome::Write(30)])
            .on("https://yt/2", vec![DownloadOutcome::Write(260)]);

        let resolution = fx.resolve(&search, &downloader).await;
        assert!(matches!(resolution, Resolution::Accepted { attempts: 2, .. }));
        assert_eq!(std::fs::read_to_string(fx.target()).unwrap(), "260");
    }

    #[tokio::test]
    async fn test_all_candidates_too_short_exhausts() {
        let fx = Fixture::new();
        let queries = fx.planner.plan_queries(&TrackReference::new("Fleetwood Mac", "Dreams"));
        let mut search = ScriptedSearch::new();
        for (i, query) in queries.iter().enumerate() {
            search = search.on(
                query,
                vec![
                    candidate_at(&format!("https://yt/{}a", i), "Dreams", "Fleetwood Mac", 257),
                    candidate_at(&format!("https://yt/{}b", i), "Dreams", "Fleetwood Mac", 300),
                ],
            );
        }
        // Search metadata looks fine, but every file measures 30s
        let downloader = ScriptedDownloader::always(30);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Exhausted { attempts: 6 });
        assert_eq!(search.calls().len(), queries.len());
        assert!(!fx.target().exists());
    }

    #[tokio::test]
    async fn test_full_album_exhausts_without_download() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![candidate("Fleetwood Mac Full Album", "Fleetwood Mac", 9000)]);
        let downloader = ScriptedDownloader::always(257);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Exhausted { attempts: 0 });
        assert!(downloader.calls().is_empty());
        assert_eq!(search.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_search_failure_advances_to_next_query() {
        let fx = Fixture::new();
        let queries = fx.planner.plan_queries(&TrackReference::new("Fleetwood Mac", "Dreams"));
        let search = ScriptedSearch::new()
            .failing(&queries[0], BackendError::Timeout(30))
            .on(&queries[1], vec![candidate("Dreams", "Fleetwood Mac - Topic", 257)]);
        let downloader = ScriptedDownloader::always(257);

        let resolution = fx.resolve(&search, &downloader).await;
        assert!(matches!(resolution, Resolution::Accepted { attempts: 1, .. }));
        assert_eq!(search.calls(), queries[..2].to_vec());
    }

    #[tokio::test]
    async fn test_repeated_url_not_downloaded_twice() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![candidate_at("https://yt/1", "Dreams", "Fleetwood Mac", 257)]);
        let downloader = ScriptedDownloader::new().on("https://yt/1", vec![DownloadOutcome::Write(30)]);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Exhausted { attempts: 1 });
        assert_eq!(downloader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap() {
        let mut fx = Fixture::new();
        fx.policy.max_attempts_per_track = 2;
        let search = ScriptedSearch::always(
            (0..5)
                .map(|i| candidate_at(&format!("https://yt/{}", i), "Dreams", "Fleetwood Mac", 257))
                .collect(),
        );
        let downloader = ScriptedDownloader::new();

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Exhausted { attempts: 2 });
        assert_eq!(downloader.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let search = ScriptedSearch::always(vec![candidate("Dreams", "Fleetwood Mac", 257)]);
        let downloader = ScriptedDownloader::always(257);

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Cancelled { attempts: 0 });
        assert!(search.calls().is_empty());
    }

    /// Writes a short file, then cancels before returning it.
    struct CancellingDownloader {
        cancel: CancelToken,
    }

    #[async_trait::async_trait]
    impl DownloadBackend for CancellingDownloader {
        async fn download(
            &self,
            _source_url: &str,
            target: &Path,
            _tier: &FallbackTier,
        ) -> Result<PathBuf, BackendError> {
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, "30").unwrap();
            self.cancel.cancel();
            Ok(target.to_path_buf())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_download_discards_unverified_file() {
        let fx = Fixture::new();
        let search = ScriptedSearch::always(vec![candidate(
            "Fleetwood Mac - Dreams (Official Audio)",
            "Fleetwood Mac",
            257,
        )]);
        let downloader = CancellingDownloader {
            cancel: fx.cancel.clone(),
        };

        let resolution = fx.resolve(&search, &downloader).await;
        assert_eq!(resolution, Resolution::Cancelled { attempts: 1 });
        assert!(!fx.target().exists());
    }

    #[test]
    fn test_attempt_cap_is_bounded_by_cross_product() {
        let policy = AcquisitionPolicy {
            bounds: DurationBounds::default(),
            search_results: 2,
            max_attempts_per_track: 100,
            tiers: vec![tier(0), tier(1)],
        };
        assert_eq!(policy.attempt_cap(3), 12);
        assert_eq!(policy.attempt_cap(0), 0);
    }
}
