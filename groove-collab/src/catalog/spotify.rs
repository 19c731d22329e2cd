use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::{Catalog, CatalogError, TrackInfo};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const SEARCH_LIMIT: &str = "20";

/// Tokens are refreshed this long before they actually expire
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Searches the Spotify catalog using the client credentials flow
pub struct SpotifyCatalog {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Paging<Track>>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Track {
    id: String,
    name: String,
    artists: Vec<Artist>,
    album: Album,
    duration_ms: u32,
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    name: String,
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

impl SpotifyCatalog {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    /// Returns the cached token, fetching a new one if it is missing or about to expire
    async fn access_token(&self) -> Result<String, CatalogError> {
        let cached = self.token.lock().clone();

        if let Some(token) = cached.filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value);
        }

        debug!("Fetching a new Spotify access token");

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::FetchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_unsuccessful_request(response, status).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_MARGIN);

        *self.token.lock() = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, CatalogError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/search", API_BASE))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", SEARCH_LIMIT)])
            .send()
            .await
            .map_err(|e| CatalogError::FetchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // Revoked early, the next search fetches a new one
                *self.token.lock() = None;
            }

            return Err(handle_unsuccessful_request(response, status).await);
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))?;

        Ok(result
            .tracks
            .map(|p| p.items.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }
}

impl From<Track> for TrackInfo {
    fn from(track: Track) -> Self {
        let artist = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            track_ref: track.id,
            title: track.name,
            artist,
            artwork_url: track.album.images.into_iter().next().map(|i| i.url),
            album: Some(track.album.name),
            preview_url: track.preview_url,
            duration_ms: Some(track.duration_ms),
        }
    }
}

async fn handle_unsuccessful_request(response: Response, status: StatusCode) -> CatalogError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CatalogError::Unauthorized;
    }

    let body = response.text().await.unwrap_or_default();
    CatalogError::FetchError(format!("{}: {}", status, body))
}
