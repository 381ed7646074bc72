//! Track references from a local JSON file.
//!
//! The file holds an array of objects:
//!
//! ```json
//! [{"artist": "Fleetwood Mac", "title": "Dreams", "explicit": false, "duration_hint_seconds": 257}]
//! ```
//!
//! `explicit` and `duration_hint_seconds` are optional. The keyword passed
//! to [`CatalogSearch::find_tracks`] is ignored.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{CatalogError, CatalogOptions, CatalogSearch};
use crate::model::TrackReference;

pub struct TrackFileCatalog {
    path: PathBuf,
    options: CatalogOptions,
}

impl TrackFileCatalog {
    pub fn new(path: impl Into<PathBuf>, options: CatalogOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

#[async_trait]
impl CatalogSearch for TrackFileCatalog {
    async fn find_tracks(&self, _keyword: &str) -> Result<Vec<TrackReference>, CatalogError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::Read(self.path.clone(), e))?;
        let references: Vec<TrackReference> =
            serde_json::from_str(&contents).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let references = self.options.limit(references);
        tracing::info!("Read {} tracks from {:?}", references.len(), self.path);
        Ok(references)
    }
}
