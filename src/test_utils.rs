//! Test utilities and fixtures for tune-harvest tests.
//!
//! Provides factories for search candidates and track references so tests
//! only spell out the fields they care about.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{candidate, dreams};
//!
//! let c = candidate("Dreams (Official Audio)", "Fleetwood Mac", 257);
//! let r = dreams();
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::model::{SearchCandidate, TrackReference};

static NEXT_URL: AtomicUsize = AtomicUsize::new(0);

/// A non-live candidate with a unique source URL. The uploader mirrors the
/// channel.
pub fn candidate(title: &str, channel: &str, duration_seconds: u32) -> SearchCandidate {
    let n = NEXT_URL.fetch_add(1, Ordering::Relaxed);
    candidate_at(
        &format!("https://www.youtube.com/watch?v=test{}", n),
        title,
        channel,
        duration_seconds,
    )
}

/// Like [`candidate`] with a fixed source URL.
pub fn candidate_at(url: &str, title: &str, channel: &str, duration_seconds: u32) -> SearchCandidate {
    SearchCandidate {
        title: title.to_string(),
        channel: channel.to_string(),
        uploader: channel.to_string(),
        duration_seconds,
        source_url: url.to_string(),
        is_live: false,
    }
}

/// Fleetwood Mac - Dreams, 257 seconds per the catalog.
pub fn dreams() -> TrackReference {
    TrackReference::new("Fleetwood Mac", "Dreams").with_duration_hint(257)
}

