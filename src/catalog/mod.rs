//! Catalog search: where the batch of track references comes from.
//!
//! Two sources implement [`CatalogSearch`]:
//! - [`spotify::SpotifyCatalog`] searches playlists by keyword
//! - [`file::TrackFileCatalog`] reads a JSON array of references from disk
//!
//! Both apply the same [`CatalogOptions`]: optional duration pre-filter and
//! a cap on the number of references.

use async_trait::async_trait;

use crate::config::Config;
use crate::model::{DurationBounds, TrackReference};

pub mod file;
pub mod spotify;

pub use file::TrackFileCatalog;
pub use spotify::SpotifyCatalog;

/// Errors that can occur while fetching references
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog credentials missing: set spotify_client_id and spotify_client_secret")]
    MissingCredentials,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited by catalog API")]
    RateLimited,

    #[error("Failed to read track file {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
}

/// Source of track references.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn find_tracks(&self, keyword: &str) -> Result<Vec<TrackReference>, CatalogError>;
}

/// Limits shared by every catalog.
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub playlist_limit: u32,
    pub exclude_playlist_keywords: Vec<String>,
    pub max_tracks: usize,
    /// Drop references whose reported duration is outside these bounds
    pub prefilter: Option<DurationBounds>,
}

impl CatalogOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            playlist_limit: config.catalog.playlist_limit,
            exclude_playlist_keywords: config
                .catalog
                .exclude_playlist_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            max_tracks: config.profile.max_tracks,
            prefilter: config
                .duration
                .prefilter_catalog
                .then(|| config.duration.bounds()),
        }
    }

    /// Whether a reference survives the duration pre-filter.
    ///
    /// References without a duration hint always pass.
    pub fn accepts(&self, reference: &TrackReference) -> bool {
        match (self.prefilter, reference.duration_hint_seconds) {
            (Some(bounds), Some(seconds)) => bounds.contains(seconds),
            _ => true,
        }
    }

    /// Whether a playlist's name or description mentions an excluded keyword.
    pub fn is_irrelevant_playlist(&self, name: &str, description: &str) -> bool {
        let text = format!("{} {}", name, description).to_lowercase();
        self.exclude_playlist_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
    }

    /// Apply the pre-filter and the track cap to a list of references.
    pub fn limit(&self, references: impl IntoIterator<Item = TrackReference>) -> Vec<TrackReference> {
        references
            .into_iter()
            .filter(|r| {
                let keep = self.accepts(r);
                if !keep {
                    tracing::debug!("Catalog duration out of bounds, skipping {}", r);
                }
                keep
            })
            .take(self.max_tracks)
            .collect()
    }
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefilter() {
        let options = CatalogOptions::default();
        assert!(options.accepts(&TrackReference::new("A", "B")));
        assert!(options.accepts(&TrackReference::new("A", "B").with_duration_hint(257)));
        assert!(!options.accepts(&TrackReference::new("A", "B").with_duration_hint(100)));

        let lenient = CatalogOptions {
            prefilter: None,
            ..CatalogOptions::default()
        };
        assert!(lenient.accepts(&TrackReference::new("A", "B").with_duration_hint(100)));
    }

    #[test]
    fn test_irrelevant_playlist() {
        let options = CatalogOptions::default();
        assert!(options.is_irrelevant_playlist("Rock Classics", ""));
        assert!(options.is_irrelevant_playlist("Hits", "the best K-Pop of 2024"));
        assert!(!options.is_irrelevant_playlist("Today's Top Hits", "The biggest songs right now"));
    }

    #[test]
    fn test_limit_applies_filter_then_cap() {
        let options = CatalogOptions {
            max_tracks: 2,
            ..CatalogOptions::default()
        };
        let refs = vec![
            TrackReference::new("A", "Too Short").with_duration_hint(60),
            TrackReference::new("B", "One").with_duration_hint(200),
            TrackReference::new("C", "Two"),
            TrackReference::new("D", "Three"),
        ];
        let limited = options.limit(refs);
        let titles: Vec<_> = limited.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }
}
