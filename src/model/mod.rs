//! Core data models for the acquisition pipeline.
//!
//! Defines the entities that flow through one run:
//! - [`TrackReference`] - what we want (input from the catalog)
//! - [`SearchCandidate`] / [`RankedCandidate`] - what the search backend offers
//! - [`AcquiredFile`] - what we ended up with on disk
//!
//! Plus the small value types shared by every stage: [`DurationBounds`] and
//! [`FallbackTier`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A textual (artist, title) reference to a piece of music.
///
/// Immutable input to the pipeline, supplied by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackReference {
    pub artist: String,
    pub title: String,
    /// Whether the catalog flags this recording as explicit
    #[serde(default)]
    pub explicit: bool,
    /// Duration reported by the catalog, if any
    #[serde(default)]
    pub duration_hint_seconds: Option<u32>,
}

impl TrackReference {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            explicit: false,
            duration_hint_seconds: None,
        }
    }

    pub fn explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn with_duration_hint(mut self, seconds: u32) -> Self {
        self.duration_hint_seconds = Some(seconds);
        self
    }
}

impl fmt::Display for TrackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// One search result from the search backend. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub title: String,
    pub channel: String,
    pub uploader: String,
    /// 0 when the backend did not report a duration
    pub duration_seconds: u32,
    pub source_url: String,
    pub is_live: bool,
}

/// A candidate that survived filtering, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: SearchCandidate,
    pub score: f64,
}

/// A downloaded file that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    pub path: PathBuf,
    pub measured_duration_seconds: u32,
}

/// Inclusive duration window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min: u32,
    pub max: u32,
}

impl DurationBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// True when `min <= seconds <= max`.
    pub fn contains(&self, seconds: u32) -> bool {
        seconds >= self.min && seconds <= self.max
    }

    /// Target duration used by the ranker's distance penalty.
    pub fn midpoint(&self) -> f64 {
        (self.min as f64 + self.max as f64) / 2.0
    }
}

impl Default for DurationBounds {
    fn default() -> Self {
        Self { min: 153, max: 720 }
    }
}

impl fmt::Display for DurationBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}s, {}s]", self.min, self.max)
    }
}

/// One (format, client identity) combination the download backend can try.
///
/// Tiers are ordered from most compatible to most permissive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTier {
    /// Format selector handed to the backend
    pub format: String,
    /// Client identity the backend should present
    pub client: String,
}

impl FallbackTier {
    pub fn new(format: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            client: client.into(),
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.format, self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = DurationBounds::new(153, 720);
        assert!(bounds.contains(153));
        assert!(bounds.contains(720));
        assert!(!bounds.contains(152));
        assert!(!bounds.contains(721));
        assert_eq!(bounds.midpoint(), 436.5);
    }

    #[test]
    fn test_track_reference_builder() {
        let reference = TrackReference::new("Drake", "Take Care")
            .explicit(true)
            .with_duration_hint(277);
        assert!(reference.explicit);
        assert_eq!(reference.duration_hint_seconds, Some(277));
        assert_eq!(reference.to_string(), "Drake - Take Care");
    }

    #[test]
    fn test_track_reference_deserializes_with_defaults() {
        let json = r#"{"artist": "Fleetwood Mac", "title": "Dreams"}"#;
        let reference: TrackReference = serde_json::from_str(json).unwrap();
        assert!(!reference.explicit);
        assert_eq!(reference.duration_hint_seconds, None);
    }
}
