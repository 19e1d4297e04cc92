//! Catalog client for the external movie service.
//!
//! The catalog is an external collaborator: this crate only reads it.
//! It handles:
//! - Fetching the full catalog snapshot
//! - Fetching the popularity-ordered subset used as the cold-start fallback
//! - Decoding the service's JSON shape into `CatalogMovie`
//! - Mapping transport and decode failures onto `CatalogError`
//!
//! No caching happens here: the scorer refetches on every call, so catalog
//! freshness is bounded only by the collaborator itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors when talking to the catalog service.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Transport failure or non-success status; recommendations cannot be
    /// generated without a catalog, so callers surface this as-is.
    #[error("catalog service unavailable: {0}")]
    Unavailable(String),

    /// The service answered but the body did not decode.
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// One movie as the catalog service serves it.
///
/// Scoring only reads `id`, `genres` and `rating`; the display metadata is
/// tolerated on the wire and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMovie {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "genre")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub release_year: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct MovieListResponse {
    movies: Vec<CatalogMovie>,
}

/// Read access to the movie catalog.
///
/// A trait seam so the scorer can be exercised against an in-memory
/// catalog in tests.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// The full current catalog snapshot. Always the complete list; there
    /// is no delta fetch.
    async fn fetch_all(&self) -> Result<Vec<CatalogMovie>, CatalogError>;

    /// Up to `limit` movies ordered by the catalog's own popularity signal.
    async fn fetch_popular(&self, limit: usize) -> Result<Vec<CatalogMovie>, CatalogError>;
}

/// HTTP implementation against the movie service's REST endpoints.
pub struct HttpCatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    /// Build a client for the movie service at `base_url`
    /// (e.g. "http://localhost:3001").
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_movies(&self, request: reqwest::RequestBuilder) -> Result<Vec<CatalogMovie>, CatalogError> {
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let body: MovieListResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        debug!("Fetched {} catalog movies", body.movies.len());
        Ok(body.movies)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_all(&self) -> Result<Vec<CatalogMovie>, CatalogError> {
        let url = format!("{}/api/movies", self.base_url);
        self.get_movies(self.http.get(url)).await
    }

    async fn fetch_popular(&self, limit: usize) -> Result<Vec<CatalogMovie>, CatalogError> {
        let url = format!("{}/api/movies/popular", self.base_url);
        self.get_movies(self.http.get(url).query(&[("limit", limit)])).await
    }
}
