//! Genre affinity derivation from a user's preference records.

use std::collections::HashMap;

use preference_store::PreferenceRecord;

/// Accumulate a genre-weight map from one user's records.
///
/// Each record contributes `rating × watch_count` to every genre tag it
/// carries, so genres the user rates highly and rewatches dominate. The
/// map is derived per scoring call and never persisted.
pub fn genre_weights(records: &[PreferenceRecord]) -> HashMap<String, f32> {
    let mut weights: HashMap<String, f32> = HashMap::new();

    for record in records {
        let signal = record.rating * record.watch_count as f32;
        for genre in &record.favorite_genres {
            *weights.entry(genre.clone()).or_insert(0.0) += signal;
        }
    }

    weights
}
