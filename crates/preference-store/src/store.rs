//! The `PreferenceStore` trait and the in-memory implementation.
//!
//! The store is the only shared mutable resource in the engine. Both
//! ingestion paths and any number of concurrent scoring calls hold the same
//! handle, so the contract is deliberately narrow: one atomic upsert
//! primitive plus a range query by user. No caller ever performs a
//! read-modify-write around the store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{MovieId, PreferenceRecord, PreferenceUpdate, UserId};

/// Keyed persistence for preference records.
///
/// ## Design Note
/// `upsert_interaction` must be a single store operation. When two events
/// for the same (user, movie) pair race across ingestion paths, both
/// increments land and the later writer wins on `rating`/`favorite_genres`;
/// no coordination happens outside the store.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Atomically apply one interaction to the record for
    /// `(update.user_id, update.movie_id)`, creating it if absent.
    ///
    /// Effects: `watch_count` is incremented (1 on creation),
    /// `last_watched` is set to `update.observed_at`, `rating` is
    /// overwritten iff `update.rating` is present, and `favorite_genres`
    /// is overwritten iff `update.genres` is present and non-empty.
    ///
    /// Returns the record as it stands after the upsert.
    async fn upsert_interaction(&self, update: &PreferenceUpdate) -> Result<PreferenceRecord>;

    /// All preference records for one user, in no particular order.
    async fn records_for_user(&self, user_id: &str) -> Result<Vec<PreferenceRecord>>;
}

/// In-memory `PreferenceStore` backed by a single keyed map.
///
/// The write guard spans exactly the upsert; nothing awaits while the lock
/// is held, so the operation is atomic from every caller's point of view.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    records: RwLock<HashMap<(UserId, MovieId), PreferenceRecord>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of records held, for logging and tests.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn upsert_interaction(&self, update: &PreferenceUpdate) -> Result<PreferenceRecord> {
        let mut records = self.records.write().await;
        let key = (update.user_id.clone(), update.movie_id.clone());

        let record = records
            .entry(key)
            .and_modify(|record| {
                record.watch_count += 1;
                record.last_watched = update.observed_at;
                if let Some(rating) = update.rating {
                    record.rating = rating;
                }
                if let Some(genres) = &update.genres {
                    if !genres.is_empty() {
                        record.favorite_genres = genres.clone();
                    }
                }
            })
            .or_insert_with(|| PreferenceRecord {
                user_id: update.user_id.clone(),
                movie_id: update.movie_id.clone(),
                rating: update.rating.unwrap_or(0.0),
                watch_count: 1,
                last_watched: update.observed_at,
                favorite_genres: update.genres.clone().unwrap_or_default(),
            });

        Ok(record.clone())
    }

    async fn records_for_user(&self, user_id: &str) -> Result<Vec<PreferenceRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}
