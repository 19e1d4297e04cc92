//! Error types for the preference store.

use thiserror::Error;

/// Errors surfaced by a preference store implementation.
///
/// Callers never see a partial write: an upsert either lands atomically or
/// fails with `Unavailable`, in which case the ingestion path that issued
/// it owns the retry decision.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached or the operation timed out.
    #[error("preference store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, StoreError>;
