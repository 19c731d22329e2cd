use serde::{Deserialize, Serialize};

use crate::CollabError;

/// A track as the catalog describes it. Only `track_ref` matters to the queue,
/// the rest is carried along for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Opaque reference into the catalog, e.g. a Spotify id
    pub track_ref: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
    pub preview_url: Option<String>,
    pub duration_ms: Option<u32>,
}

impl TrackInfo {
    const MAX_FIELD_LENGTH: usize = 512;

    /// Trims the track and ensures it has everything needed to be queued
    pub fn validated(mut self) -> Result<Self, CollabError> {
        self.track_ref = self.track_ref.trim().to_string();
        self.title = self.title.trim().to_string();
        self.artist = self.artist.trim().to_string();

        if self.track_ref.is_empty() {
            return Err(CollabError::InvalidInput("Track reference required".into()));
        }

        if self.title.is_empty() || self.artist.is_empty() {
            return Err(CollabError::InvalidInput("Title and artist required".into()));
        }

        let too_long = [&self.track_ref, &self.title, &self.artist]
            .iter()
            .any(|field| field.chars().count() > Self::MAX_FIELD_LENGTH);

        if too_long {
            return Err(CollabError::InvalidInput("Track field is too long".into()));
        }

        Ok(self)
    }
}
