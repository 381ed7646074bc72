//! Audio file metadata via the lofty crate.
//!
//! Provides the production [`DurationProbe`] and [`TagWriter`] used by the
//! pipeline, plus a tag reader for seeding the index from an existing
//! library folder. Format-independent: MP3, M4A, FLAC, OGG and WAV all go
//! through the same calls.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};
use std::path::Path;

use crate::backend::{DurationProbe, TagWriter};
use crate::error::{Error, Result};

/// Duration probe reading the container's audio properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyProbe;

impl DurationProbe for LoftyProbe {
    fn probe_duration(&self, path: &Path) -> u32 {
        match Probe::open(path).and_then(|probe| probe.read()) {
            Ok(tagged_file) => {
                let seconds = tagged_file.properties().duration().as_secs();
                u32::try_from(seconds).unwrap_or(u32::MAX)
            }
            Err(e) => {
                tracing::debug!("Duration probe failed for {:?}: {}", path, e);
                0
            }
        }
    }
}

/// Writes genre, artist and title into the file's primary tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write_tags(&self, path: &Path, genre: &str, artist: &str, title: &str) -> Result<()> {
        let mut tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| Error::metadata(path, format!("failed to read file for tagging: {}", e)))?;

        // Get the primary tag type for this format, or create one
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| Error::metadata(path, "format has no writable tag"))?;

        tag.set_genre(genre.to_string());
        tag.set_artist(artist.to_string());
        tag.set_title(title.to_string());

        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| Error::metadata(path, format!("failed to write tags: {}", e)))?;

        tracing::info!(
            "Tagged {:?} [artist={} | title={} | genre={}]",
            path.file_name().unwrap_or_default(),
            artist,
            title,
            genre
        );
        Ok(())
    }
}

/// Artist and title from embedded tags, if the file can be read at all.
pub fn read_artist_title(path: &Path) -> Option<(Option<String>, Option<String>)> {
    let tagged_file = Probe::open(path).and_then(|probe| probe.read()).ok()?;

    // Get the primary tag, or fall back to the first available tag
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;

    let non_empty = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    Some((non_empty(tag.artist()), non_empty(tag.title())))
}
