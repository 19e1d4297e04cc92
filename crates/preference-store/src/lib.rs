//! # Preference Store Crate
//!
//! Domain types and keyed persistence for per-(user, movie) preference
//! records.
//!
//! ## Main Components
//!
//! - **types**: `PreferenceRecord`, `IngestionEvent`, `PreferenceUpdate`
//! - **store**: the `PreferenceStore` trait and `MemoryPreferenceStore`
//! - **error**: `StoreError`
//!
//! ## Example Usage
//!
//! ```ignore
//! use preference_store::{MemoryPreferenceStore, PreferenceStore, PreferenceUpdate};
//!
//! let store = MemoryPreferenceStore::new();
//! let record = store.upsert_interaction(&update).await?;
//! let history = store.records_for_user("u1").await?;
//! ```
//!
//! The store exposes exactly one write primitive. Everything the engine
//! knows about a user flows through `upsert_interaction`, which keeps the
//! concurrency story simple: the upsert is atomic, and racing writers
//! resolve to last-writer-wins on the overwritable fields.

// Public modules
pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{Result, StoreError};
pub use store::{MemoryPreferenceStore, PreferenceStore};
pub use types::{IngestionEvent, MovieId, PreferenceRecord, PreferenceUpdate, UserId};
