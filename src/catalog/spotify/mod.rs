//! Spotify Web API integration
//!
//! Searches playlists by keyword and turns their tracks into
//! [`TrackReference`]s. Authenticates with the client-credentials flow.
//!
//! API docs: https://developer.spotify.com/documentation/web-api

pub mod dto;
mod adapter;
mod client;

use async_trait::async_trait;

pub use adapter::to_reference;
pub use client::SpotifyClient;

use super::{CatalogError, CatalogOptions, CatalogSearch};
use crate::config::Credentials;
use crate::model::TrackReference;

/// Playlist-keyword catalog backed by [`SpotifyClient`].
pub struct SpotifyCatalog {
    client: SpotifyClient,
    options: CatalogOptions,
}

impl SpotifyCatalog {
    pub fn new(credentials: &Credentials, options: CatalogOptions) -> Result<Self, CatalogError> {
        let client = SpotifyClient::new(
            credentials.spotify_client_id.clone().unwrap_or_default(),
            credentials.spotify_client_secret.clone().unwrap_or_default(),
        )?;
        Ok(Self { client, options })
    }

    #[cfg(test)]
    fn with_client(client: SpotifyClient, options: CatalogOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl CatalogSearch for SpotifyCatalog {
    async fn find_tracks(&self, keyword: &str) -> Result<Vec<TrackReference>, CatalogError> {
        tracing::info!("Searching for playlists related to: {}", keyword);
        let playlists = self
            .client
            .search_playlists(keyword, self.options.playlist_limit)
            .await?;

        let mut references = Vec::new();
        for playlist in playlists {
            if references.len() >= self.options.max_tracks {
                break;
            }
            let description = playlist.description.as_deref().unwrap_or_default();
            if self.options.is_irrelevant_playlist(&playlist.name, description) {
                tracing::info!("Skipping playlist: {}", playlist.name);
                continue;
            }

            tracing::info!("Reading playlist: {}", playlist.name);
            let items = match self.client.playlist_tracks(&playlist.id).await {
                Ok(items) => items,
                // One bad playlist does not sink the batch
                Err(e) => {
                    tracing::warn!("Failed to fetch tracks from playlist {}: {}", playlist.name, e);
                    continue;
                }
            };

            let remaining = self.options.max_tracks - references.len();
            let found = items
                .into_iter()
                .filter_map(|item| item.track)
                .filter_map(to_reference);
            references.extend(
                self.options
                    .limit(found)
                    .into_iter()
                    .take(remaining),
            );
        }

        tracing::info!("Found {} total tracks after filtering", references.len());
        Ok(references)
    }
}
