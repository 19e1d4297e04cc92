//! # Recommendation Scorer
//!
//! On-demand, content-based ranking of catalog movies against one user's
//! aggregated preference signal:
//! 1. Fetch the user's preference records
//! 2. No history → popularity fallback (not an error)
//! 3. Derive the genre-weight map
//! 4. Fetch the full catalog snapshot
//! 5. Drop already-seen movies
//! 6. Score, stable-sort descending, truncate to the limit
//!
//! Everything is single-pass over one user's signal; there is no
//! cross-user computation and no persisted model.

pub mod genre_weights;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, instrument};

use catalog_client::{CatalogClient, CatalogError, CatalogMovie};
use preference_store::{PreferenceStore, StoreError};

pub use genre_weights::genre_weights;

/// Movies returned when the caller does not specify a limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Weight of the catalog's own quality signal in the final score. It keeps
/// movies from genres absent in the user's history competitive, while a
/// strong, repeated genre signal can still outrank raw catalog rating.
const CATALOG_RATING_WEIGHT: f32 = 10.0;

/// Errors from a single scoring call.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// The requested limit is not a positive integer.
    #[error("limit must be a positive integer")]
    InvalidLimit,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The catalog could not be fetched. Never masked as an empty list: a
    /// response without a catalog cannot be personalized.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One ranked movie; lives only for the duration of a scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMovie {
    pub movie_id: String,
    pub title: String,
    pub score: f32,
}

/// Ranks unseen catalog movies against a user's genre affinity.
pub struct RecommendationScorer {
    store: Arc<dyn PreferenceStore>,
    catalog: Arc<dyn CatalogClient>,
}

impl RecommendationScorer {
    pub fn new(store: Arc<dyn PreferenceStore>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { store, catalog }
    }

    /// Top-`limit` recommendations for `user_id`.
    ///
    /// Users with no recorded history get the catalog's own popularity
    /// ordering, unpersonalized; that path is a normal response, not an
    /// error. Already-seen movies are never returned.
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<ScoredMovie>, ScoringError> {
        if limit == 0 {
            return Err(ScoringError::InvalidLimit);
        }

        let records = self.store.records_for_user(user_id).await?;
        if records.is_empty() {
            debug!("No history for user {}, serving popularity fallback", user_id);
            let popular = self.catalog.fetch_popular(limit).await?;
            return Ok(popular
                .into_iter()
                .take(limit)
                .map(|movie| ScoredMovie {
                    score: movie.rating,
                    movie_id: movie.id,
                    title: movie.title,
                })
                .collect());
        }

        let weights = genre_weights(&records);
        let snapshot = self.catalog.fetch_all().await?;
        let seen: HashSet<&str> = records.iter().map(|r| r.movie_id.as_str()).collect();

        let mut ranked = rank_unseen(snapshot, &weights, &seen);
        ranked.truncate(limit);

        info!(
            "Ranked {} movies for user {} across {} weighted genres",
            ranked.len(),
            user_id,
            weights.len()
        );
        Ok(ranked)
    }
}

/// Score every unseen movie and sort descending.
///
/// `score = Σ weights[genre] + rating × 10`. The sort is stable with no
/// secondary key, so equal scores keep catalog iteration order.
pub fn rank_unseen(
    snapshot: Vec<CatalogMovie>,
    weights: &HashMap<String, f32>,
    seen: &HashSet<&str>,
) -> Vec<ScoredMovie> {
    let mut scored: Vec<ScoredMovie> = snapshot
        .into_par_iter()
        .filter(|movie| !seen.contains(movie.id.as_str()))
        .map(|movie| {
            let genre_affinity: f32 = movie
                .genres
                .iter()
                .filter_map(|genre| weights.get(genre))
                .sum();
            ScoredMovie {
                score: genre_affinity + movie.rating * CATALOG_RATING_WEIGHT,
                movie_id: movie.id,
                title: movie.title,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored
}
