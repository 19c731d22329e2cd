use async_trait::async_trait;
use thiserror::Error;

use crate::TrackInfo;

mod spotify;
pub use spotify::*;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog rejected our credentials")]
    Unauthorized,

    #[error("Failed to fetch resource: {0}")]
    FetchError(String),

    #[error("Failed to parse resource: {0}")]
    ParseError(String),
}

/// Somewhere to look up tracks that can be queued
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, CatalogError>;
}

/// A fixed list of tracks, matched by title or artist
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    tracks: Vec<TrackInfo>,
}

impl StaticCatalog {
    pub fn new(tracks: Vec<TrackInfo>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn search(&self, query: &str) -> Result<Vec<TrackInfo>, CatalogError> {
        let query = query.to_lowercase();

        Ok(self
            .tracks
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&query) || t.artist.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }
}
