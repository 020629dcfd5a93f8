//! User and track storage abstractions.
//!
//! The resolver only needs a narrow slice of each store: point lookups, one targeted
//! bookmark update and a track save. Both traits are async because the production
//! implementations talk to Postgres; the in-memory implementations back tests and dev runs.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use parcelmark_core::{TrackId, UserId};
use parcelmark_tracking::{Track, User};

pub use in_memory::{InMemoryTrackStore, InMemoryUserStore};
pub use postgres::{PostgresTrackStore, PostgresUserStore};

/// Store operation error.
///
/// These are infrastructure failures; a missing record is `Ok(None)`, never an error.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not serve the request (lock poisoned, pool closed, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The database rejected or failed a query.
    #[error("database error: {0}")]
    Database(String),
    /// A stored row could not be mapped back into a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Access to user accounts and their bookmark lists.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user with the full, ordered bookmark list.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Set `track_id` on the first bookmark of `user_id` whose tracking number is
    /// `track_number`.
    ///
    /// Returns `false` when no bookmark matched (the user or bookmark vanished meanwhile).
    async fn set_bookmark_track_id(
        &self,
        user_id: UserId,
        track_number: &str,
        track_id: TrackId,
    ) -> Result<bool, StoreError>;
}

/// Access to shipment records.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// First track whose tracking number is `track_number`, history statuses unresolved.
    async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError>;

    /// Track by id with every history status joined to its `Status` record.
    ///
    /// Entries whose status no longer exists come back with `status: None`.
    async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError>;

    /// Persist the track's own fields (number, owner, price, weight), inserting it if new.
    ///
    /// History belongs to the ingestion pipeline; saving never rewrites it.
    async fn save(&self, track: &Track) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn set_bookmark_track_id(
        &self,
        user_id: UserId,
        track_number: &str,
        track_id: TrackId,
    ) -> Result<bool, StoreError> {
        (**self)
            .set_bookmark_track_id(user_id, track_number, track_id)
            .await
    }
}

#[async_trait]
impl<S> TrackStore for Arc<S>
where
    S: TrackStore + ?Sized,
{
    async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError> {
        (**self).find_by_number(track_number).await
    }

    async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
        (**self).find_with_statuses(id).await
    }

    async fn save(&self, track: &Track) -> Result<(), StoreError> {
        (**self).save(track).await
    }
}
