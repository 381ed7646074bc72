//! Adapter layer: Spotify DTOs to domain references.

use super::dto;
use crate::model::TrackReference;

/// Convert a playlist track into a reference.
///
/// Only the primary (first-listed) artist is kept. Tracks without a name or
/// any artist yield `None`.
pub fn to_reference(track: dto::Track) -> Option<TrackReference> {
    let title = track.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
    let artist = track
        .artists
        .into_iter()
        .map(|a| a.name.trim().to_string())
        .find(|n| !n.is_empty())?;

    let mut reference = TrackReference::new(artist, title).explicit(track.explicit);
    if let Some(ms) = track.duration_ms {
        reference = reference.with_duration_hint(ms_to_seconds(ms));
    }
    Some(reference)
}

/// Round to the nearest second.
fn ms_to_seconds(ms: u64) -> u32 {
    u32::try_from((ms + 500) / 1000).unwrap_or(u32::MAX)
}
