//! # Preference Aggregator
//!
//! Applies one behavioral event to the preference store: validate, reduce
//! the event to a single field delta, and issue the store's atomic upsert.
//!
//! Both ingestion paths (the streaming channel and the watch-topic
//! consumer) hold a handle to the same aggregator and nothing else; there
//! is no shared in-process state between them, so each path can be scaled
//! and tested on its own.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use preference_store::{IngestionEvent, PreferenceStore, PreferenceUpdate, StoreError};

/// Errors from applying a single event.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The event is malformed; the store was not touched.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The store could not be reached. The caller owns the retry decision:
    /// the queue consumer leaves the offset uncommitted, the streaming
    /// channel acks failure and keeps the channel open.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

/// Reduces ingestion events to atomic store upserts.
pub struct PreferenceAggregator {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceAggregator {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Apply one event to the preference store.
    ///
    /// Rejected events (`InvalidEvent`) leave the store untouched. A
    /// successful call has exactly one side effect, the upsert; the next
    /// scoring call observes the new record without any propagation here.
    pub async fn apply(&self, event: IngestionEvent) -> Result<(), AggregationError> {
        let update = validate(event)?;
        let record = self.store.upsert_interaction(&update).await?;
        debug!(
            "Applied event for user {} movie {} (watch_count: {})",
            record.user_id, record.movie_id, record.watch_count
        );
        Ok(())
    }
}

/// Check event constraints and reduce to the store-boundary shape.
///
/// Exhaustive over the event variants: a watch never carries a rating, a
/// rating must sit in [0, 10], and either variant may carry genre tags.
fn validate(event: IngestionEvent) -> Result<PreferenceUpdate, AggregationError> {
    if event.user_id().is_empty() {
        return Err(AggregationError::InvalidEvent("user_id is empty".to_string()));
    }
    if event.movie_id().is_empty() {
        return Err(AggregationError::InvalidEvent("movie_id is empty".to_string()));
    }

    match event {
        IngestionEvent::Watched {
            user_id,
            movie_id,
            occurred_at,
            genres,
            ..
        } => Ok(PreferenceUpdate {
            user_id,
            movie_id,
            observed_at: occurred_at,
            rating: None,
            genres,
        }),
        IngestionEvent::Rated {
            user_id,
            movie_id,
            occurred_at,
            rating,
            genres,
        } => {
            if !rating.is_finite() || !(0.0..=10.0).contains(&rating) {
                return Err(AggregationError::InvalidEvent(format!(
                    "rating {rating} outside [0, 10]"
                )));
            }
            Ok(PreferenceUpdate {
                user_id,
                movie_id,
                observed_at: occurred_at,
                rating: Some(rating),
                genres,
            })
        }
    }
}
