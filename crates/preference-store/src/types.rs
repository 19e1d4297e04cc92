//! Core domain types for preference aggregation.
//!
//! This module defines the data structures shared by every component:
//! the persisted per-(user, movie) preference record, the behavioral
//! events that mutate it, and the field deltas handed to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Type Aliases
// =============================================================================
// Identifiers are opaque strings issued by the account and catalog services

/// Unique identifier for a user account
pub type UserId = String;

/// Unique identifier for a catalog movie
pub type MovieId = String;

// =============================================================================
// Preference Record
// =============================================================================

/// Persisted aggregate of one user's interaction signal for one movie.
///
/// Exactly one record exists per (user_id, movie_id) pair; absence of a
/// record means no interaction has been recorded. Records are created on
/// the first qualifying event, mutated in place on every subsequent one,
/// and never deleted by this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Last explicit rating in [0, 10]; 0 until the user rates.
    pub rating: f32,
    /// Number of qualifying events seen for this pair, starting at 1.
    pub watch_count: u32,
    /// Timestamp of the most recent event for this pair.
    pub last_watched: DateTime<Utc>,
    /// Genre tags last supplied alongside an event; overwritten, not unioned.
    pub favorite_genres: Vec<String>,
}

// =============================================================================
// Ingestion Events
// =============================================================================

/// One behavioral signal, arriving via either ingestion path.
///
/// Both variants may carry genre tags: the streaming channel sends them on
/// ratings, the watch topic sends them on plain watches.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionEvent {
    Watched {
        user_id: UserId,
        movie_id: MovieId,
        occurred_at: DateTime<Utc>,
        watch_duration_secs: Option<u32>,
        genres: Option<Vec<String>>,
    },
    Rated {
        user_id: UserId,
        movie_id: MovieId,
        occurred_at: DateTime<Utc>,
        /// Explicit rating in [0, 10].
        rating: f32,
        genres: Option<Vec<String>>,
    },
}

impl IngestionEvent {
    pub fn user_id(&self) -> &str {
        match self {
            IngestionEvent::Watched { user_id, .. } => user_id,
            IngestionEvent::Rated { user_id, .. } => user_id,
        }
    }

    pub fn movie_id(&self) -> &str {
        match self {
            IngestionEvent::Watched { movie_id, .. } => movie_id,
            IngestionEvent::Rated { movie_id, .. } => movie_id,
        }
    }
}

// =============================================================================
// Store Boundary
// =============================================================================

/// Field deltas for a single atomic upsert.
///
/// The aggregator reduces every event to this shape so the store contract
/// stays one operation: increment the watch count, stamp the interaction
/// time, and overwrite rating/genres only when a value is present.
#[derive(Debug, Clone)]
pub struct PreferenceUpdate {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub observed_at: DateTime<Utc>,
    /// Overwrites the stored rating when `Some`.
    pub rating: Option<f32>,
    /// Overwrites the stored genre tags when `Some` and non-empty.
    pub genres: Option<Vec<String>>,
}
