//! Spotify HTTP client
//!
//! Handles the client-credentials token exchange and the two read-only
//! endpoints the catalog needs. The access token is cached until shortly
//! before it expires.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::dto;
use crate::catalog::CatalogError;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com";

/// Tracks requested per playlist page
const PLAYLIST_PAGE_LIMIT: u32 = 100;

/// Refresh the token this long before Spotify says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Create a new client. Fails if either credential is empty.
    pub fn new(client_id: String, client_secret: String) -> Result<Self, CatalogError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(CatalogError::MissingCredentials);
        }
        Ok(Self {
            http_client: build_http_client()?,
            client_id,
            client_secret,
            accounts_url: ACCOUNTS_URL.to_string(),
            api_url: API_URL.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Create a client for testing with custom base URLs
    #[cfg(test)]
    pub fn with_base_urls(
        client_id: &str,
        client_secret: &str,
        accounts_url: &str,
        api_url: &str,
    ) -> Self {
        Self {
            http_client: build_http_client().expect("Failed to build HTTP client"),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            accounts_url: accounts_url.to_string(),
            api_url: api_url.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Playlists matching `keyword`. Null entries in the result are dropped.
    pub async fn search_playlists(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<dto::SimplifiedPlaylist>, CatalogError> {
        let url = format!(
            "{}/v1/search?q={}&type=playlist&limit={}",
            self.api_url,
            urlencoding::encode(keyword),
            limit.clamp(1, 50)
        );
        let response: dto::PlaylistSearchResponse = self.get_json(&url).await?;
        Ok(response
            .playlists
            .map(|page| page.items.into_iter().flatten().collect())
            .unwrap_or_default())
    }

    /// First page of a playlist's tracks.
    pub async fn playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<dto::PlaylistItem>, CatalogError> {
        let url = format!(
            "{}/v1/playlists/{}/tracks?limit={}",
            self.api_url,
            urlencoding::encode(playlist_id),
            PLAYLIST_PAGE_LIMIT
        );
        let page: dto::Page<dto::PlaylistItem> = self.get_json(&url).await?;
        Ok(page.items)
    }

    /// Authorized GET with status mapping
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next call
            *self.token.lock().await = None;
            return Err(CatalogError::Auth("access token rejected".to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited);
        }

        if !status.is_success() {
            if let Ok(error) = response.json::<dto::ApiError>().await {
                return Err(CatalogError::Api(format!(
                    "{} {}",
                    error.error.status, error.error.message
                )));
            }
            return Err(CatalogError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Cached token, refreshed through the client-credentials flow when stale.
    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let response = self
            .http_client
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<dto::TokenError>().await {
                Ok(error) => error.error_description.unwrap_or(error.error),
                Err(_) => format!("HTTP {}", status),
            };
            return Err(CatalogError::Auth(message));
        }

        let token = response
            .json::<dto::TokenResponse>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        tracing::debug!("Obtained catalog access token, valid for {}s", token.expires_in);
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }
}

fn build_http_client() -> Result<reqwest::Client, CatalogError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| CatalogError::Network(format!("failed to build HTTP client: {}", e)))
}
