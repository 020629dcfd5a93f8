//! In-memory stores for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use parcelmark_core::{Entity, StatusId, TrackId, UserId};
use parcelmark_tracking::{HistoryEntry, Status, StatusRef, Track, User};

use super::{StoreError, TrackStore, UserStore};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

/// In-memory user store.
///
/// Counts writes so callers can assert whether a request touched the store.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    writes: AtomicUsize,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed (or replace) a user. Not counted as a write.
    pub fn insert(&self, user: User) {
        if let Ok(mut users) = self.users.write() {
            users.insert(*user.id(), user);
        }
    }

    /// Snapshot of a stored user.
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.read().ok()?.get(&id).cloned()
    }

    /// Number of writes performed through `UserStore`.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(read(&self.users)?.get(&id).cloned())
    }

    async fn set_bookmark_track_id(
        &self,
        user_id: UserId,
        track_number: &str,
        track_id: TrackId,
    ) -> Result<bool, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = write(&self.users)?;
        Ok(users
            .get_mut(&user_id)
            .is_some_and(|user| user.link_bookmark(track_number, track_id)))
    }
}

/// In-memory track store with its status catalogue.
///
/// Tracks are kept ordered by id; ids are time-ordered, so lookups by number return the
/// oldest matching track.
#[derive(Debug, Default)]
pub struct InMemoryTrackStore {
    tracks: RwLock<BTreeMap<TrackId, Track>>,
    statuses: RwLock<HashMap<StatusId, Status>>,
    writes: AtomicUsize,
}

impl InMemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed (or replace) a track. Not counted as a write.
    pub fn insert(&self, track: Track) {
        if let Ok(mut tracks) = self.tracks.write() {
            tracks.insert(*track.id(), unpopulated(track));
        }
    }

    /// Seed (or replace) a status.
    pub fn insert_status(&self, status: Status) {
        if let Ok(mut statuses) = self.statuses.write() {
            statuses.insert(*status.id(), status);
        }
    }

    /// Remove a status, leaving history entries that point at it dangling.
    pub fn remove_status(&self, id: StatusId) {
        if let Ok(mut statuses) = self.statuses.write() {
            statuses.remove(&id);
        }
    }

    /// Snapshot of a stored track.
    pub fn get(&self, id: TrackId) -> Option<Track> {
        self.tracks.read().ok()?.get(&id).cloned()
    }

    /// Number of writes performed through `TrackStore`.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn populate(&self, track: Track) -> Result<Track, StoreError> {
        let statuses = read(&self.statuses)?;
        let history = track
            .history
            .iter()
            .map(|entry| HistoryEntry {
                status: entry
                    .status
                    .as_ref()
                    .and_then(|s| statuses.get(&s.id()).cloned())
                    .map(StatusRef::Resolved),
                timestamp: entry.timestamp,
            })
            .collect();
        Ok(Track { history, ..track })
    }
}

fn unpopulated(track: Track) -> Track {
    let history = track.history.iter().map(HistoryEntry::unpopulated).collect();
    Track { history, ..track }
}

#[async_trait]
impl TrackStore for InMemoryTrackStore {
    async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError> {
        Ok(read(&self.tracks)?
            .values()
            .find(|t| t.track == track_number)
            .cloned())
    }

    async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
        let track = read(&self.tracks)?.get(&id).cloned();
        track.map(|t| self.populate(t)).transpose()
    }

    async fn save(&self, track: &Track) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tracks = write(&self.tracks)?;
        match tracks.get_mut(track.id()) {
            Some(stored) => {
                stored.track = track.track.clone();
                stored.user = track.user.clone();
                stored.price = track.price;
                stored.weight = track.weight;
            }
            None => {
                tracks.insert(*track.id(), unpopulated(track.clone()));
            }
        }
        Ok(())
    }
}
