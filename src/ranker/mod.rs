//! Candidate filtering and ranking.
//!
//! Raw search results for one query go through a set of rejection
//! predicates (live, short-form, blocklist, long-form, duration, and an
//! optional source check); the survivors are scored and sorted.
//!
//! Score = official bonus (+10) + topic-channel bonus (+9) + label bonus (+8)
//! minus the distance from the bounds midpoint in minutes. The sort is
//! stable, so equal scores keep discovery order.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::canonical;
use crate::config::{ConfigError, FilterConfig};
use crate::model::{DurationBounds, RankedCandidate, SearchCandidate, TrackReference};

const OFFICIAL_BONUS: f64 = 10.0;
const TOPIC_BONUS: f64 = 9.0;
const LABEL_BONUS: f64 = 8.0;

/// Why a candidate was dropped before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Live,
    ShortForm,
    Blocklisted(String),
    LongForm,
    DurationOutOfBounds(u32),
    UnverifiedSource,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live stream"),
            Self::ShortForm => write!(f, "short-form clip"),
            Self::Blocklisted(token) => write!(f, "blocklisted token {:?}", token),
            Self::LongForm => write!(f, "long-form upload"),
            Self::DurationOutOfBounds(seconds) => write!(f, "duration {}s out of bounds", seconds),
            Self::UnverifiedSource => write!(f, "neither channel nor title matches"),
        }
    }
}

/// Filters and orders search results. Built once per run from config.
#[derive(Debug, Clone)]
pub struct CandidateRanker {
    blocklist: Vec<String>,
    longform: Vec<Regex>,
    short_form_markers: Vec<String>,
    official_markers: Vec<String>,
    topic_marker: String,
    label_markers: Vec<String>,
    strict_source_match: bool,
}

impl CandidateRanker {
    /// Compile the filter configuration. Invalid patterns are a config error.
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let longform = config
            .longform_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::Invalid(format!("longform pattern {:?}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            blocklist: lowercase_all(&config.blocklist),
            longform,
            short_form_markers: lowercase_all(&config.short_form_url_markers),
            official_markers: lowercase_all(&config.official_markers),
            topic_marker: config.topic_marker.trim().to_lowercase(),
            label_markers: lowercase_all(&config.label_markers),
            strict_source_match: config.strict_source_match,
        })
    }

    /// Filter and order `candidates` for `reference`.
    pub fn rank(
        &self,
        candidates: &[SearchCandidate],
        reference: &TrackReference,
        bounds: DurationBounds,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .filter(|candidate| match self.check(candidate, reference, bounds) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::debug!("Rejected {:?} ({}): {}", candidate.title, candidate.source_url, reason);
                    false
                }
            })
            .map(|candidate| RankedCandidate {
                score: self.score(candidate, bounds),
                candidate: candidate.clone(),
            })
            .collect();

        // Vec::sort_by is stable
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Run every rejection predicate; the first match wins.
    pub fn check(
        &self,
        candidate: &SearchCandidate,
        reference: &TrackReference,
        bounds: DurationBounds,
    ) -> Result<(), RejectReason> {
        if candidate.is_live {
            return Err(RejectReason::Live);
        }

        let url = candidate.source_url.to_lowercase();
        if self.short_form_markers.iter().any(|m| url.contains(m.as_str())) {
            return Err(RejectReason::ShortForm);
        }

        let text = format!(
            "{} {} {}",
            candidate.title, candidate.channel, candidate.uploader
        )
        .to_lowercase();
        if let Some(token) = self.blocklist.iter().find(|t| contains_token(&text, t)) {
            return Err(RejectReason::Blocklisted(token.clone()));
        }

        if self.longform.iter().any(|re| re.is_match(&candidate.title)) {
            return Err(RejectReason::LongForm);
        }

        if !bounds.contains(candidate.duration_seconds) {
            return Err(RejectReason::DurationOutOfBounds(candidate.duration_seconds));
        }

        if self.strict_source_match
            && !self.looks_like_original_channel(candidate, &reference.artist)
            && !title_matches_song(&candidate.title, &reference.title)
        {
            return Err(RejectReason::UnverifiedSource);
        }

        Ok(())
    }

    /// Score a candidate that passed [`check`](Self::check).
    pub fn score(&self, candidate: &SearchCandidate, bounds: DurationBounds) -> f64 {
        let title = candidate.title.to_lowercase();
        let channel = candidate.channel.to_lowercase();
        let uploader = candidate.uploader.to_lowercase();

        let mut score = 0.0;
        if self
            .official_markers
            .iter()
            .any(|m| title.contains(m.as_str()) || channel.contains(m.as_str()))
        {
            score += OFFICIAL_BONUS;
        }
        if !self.topic_marker.is_empty() && channel.trim_end().ends_with(&self.topic_marker) {
            score += TOPIC_BONUS;
        }
        if self
            .label_markers
            .iter()
            .any(|m| channel.contains(m.as_str()) || uploader.contains(m.as_str()))
        {
            score += LABEL_BONUS;
        }

        score - (candidate.duration_seconds as f64 - bounds.midpoint()).abs() / 60.0
    }

    /// Whether the channel or uploader looks like the artist's own.
    fn looks_like_original_channel(&self, candidate: &SearchCandidate, artist: &str) -> bool {
        let artist = canonical::normalize(artist);
        if artist.is_empty() {
            return false;
        }

        [&candidate.channel, &candidate.uploader]
            .into_iter()
            .map(|name| canonical::normalize(name))
            .filter(|name| !name.is_empty())
            .any(|name| {
                (!self.topic_marker.is_empty()
                    && name.starts_with(&artist)
                    && name.ends_with(&canonical::normalize(&self.topic_marker)))
                    || self
                        .label_markers
                        .iter()
                        .any(|label| name.ends_with(&canonical::normalize(label)) && name.contains(&artist))
                    || name == artist
                    || (name.contains("official") && name.contains(&artist))
            })
    }
}

/// Whether the upload title contains the song title once both are stripped.
fn title_matches_song(video_title: &str, song_title: &str) -> bool {
    let song = canonical::canonical_title(song_title);
    !song.is_empty() && canonical::canonical_title(video_title).contains(&song)
}

/// Case-sensitive whole-token search; callers lowercase both sides.
///
/// Token boundaries are non-alphanumeric characters or the string ends, so
/// "set" matches "dj set" but not "sunset".
fn contains_token(haystack: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    haystack.match_indices(token).any(|(start, matched)| {
        let end = start + matched.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
    })
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_utils::candidate;
    use proptest::prelude::*;

    proptest! {
        /// Nothing outside the bounds survives, whatever else it scores
        #[test]
        fn ranked_durations_within_bounds(
            durations in prop::collection::vec(0u32..2000, 0..20),
            min in 60u32..300,
            span in 0u32..600,
        ) {
            let bounds = DurationBounds::new(min, min + span);
            let candidates: Vec<_> = durations
                .iter()
                .map(|&d| candidate("Dreams (Official Audio)", "Fleetwood Mac - Topic", d))
                .collect();
            let ranker = CandidateRanker::new(&FilterConfig::default()).unwrap();
            let ranked = ranker.rank(&candidates, &TrackReference::new("Fleetwood Mac", "Dreams"), bounds);
            for r in &ranked {
                prop_assert!(bounds.contains(r.candidate.duration_seconds));
            }
            prop_assert_eq!(ranked.len(), durations.iter().filter(|&&d| bounds.contains(d)).count());
        }

        /// Scores are non-increasing and equal scores keep discovery order
        #[test]
        fn ranking_is_sorted_and_stable(durations in prop::collection::vec(153u32..=720, 0..20)) {
            let candidates: Vec<_> = durations
                .iter()
                .enumerate()
                .map(|(i, &d)| {
                    let mut c = candidate("Dreams", "Fleetwood Mac", d);
                    c.source_url = format!("https://example.com/watch?v={}", i);
                    c
                })
                .collect();
            let ranker = CandidateRanker::new(&FilterConfig::default()).unwrap();
            let bounds = DurationBounds::new(153, 720);
            let ranked = ranker.rank(&candidates, &TrackReference::new("Fleetwood Mac", "Dreams"), bounds);
            prop_assert_eq!(ranked.len(), candidates.len());

            let position = |r: &RankedCandidate| {
                candidates.iter().position(|c| c.source_url == r.candidate.source_url)
            };
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(position(&pair[0]) < position(&pair[1]));
                }
            }
        }
    }
}
