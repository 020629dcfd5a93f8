//! Bookmark page resolution.
//!
//! Turns one page of a user's bookmarks into what the client renders: each bookmark is
//! joined with its shipment record, delivered shipments are hidden, and bookmarks with no
//! shipment yet are returned as bare stubs.
//!
//! ## Resolution Flow
//!
//! ```text
//! (user_id, page)
//!   ↓
//! 1. Load the user (unknown user → UserNotFound, nothing written)
//!   ↓
//! 2. Totals over the full bookmark list, then slice the requested page
//!   ↓
//! 3. Resolve every bookmark of the page concurrently:
//!      no track_id → look the track up by number
//!                      none  → Stub
//!                      found → backfill bookmark.track_id, reconcile owner, join statuses
//!      track_id    → load the track with statuses, reconcile owner
//!      delivered?  → Suppressed, otherwise Enriched
//!   ↓
//! 4. Drop Suppressed entries, keep page order
//! ```
//!
//! ## Repairs On Read
//!
//! Two denormalized fields are fixed up as a side effect: the bookmark's `track_id` and
//! the track's owner phone. Neither write is transactional; concurrent requests for the
//! same bookmark race and the last write wins. Both writes are idempotent, so a lost race
//! only costs a redundant write. Writes committed before a failure elsewhere on the page
//! stay committed.

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info, instrument};

use parcelmark_core::{TrackId, UserId};
use parcelmark_tracking::{
    Bookmark, BookmarkPage, BookmarkStub, EnrichedBookmark, PageRequest, ResolvedBookmark, Track, User,
    total_pages,
};

use crate::store::{StoreError, TrackStore, UserStore};

/// Bookmark page resolution error.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    /// A bookmark (or a just-found track) points at a track that cannot be loaded.
    #[error("track {track_id} referenced by a bookmark does not exist")]
    DanglingTrack { track_id: TrackId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves pages of a user's bookmarks against the user and track stores.
///
/// ## Generic Parameters
///
/// - `U`: user store (`Arc<dyn UserStore>` in the server, in-memory stores in tests)
/// - `T`: track store
#[derive(Debug, Clone)]
pub struct BookmarkResolver<U, T> {
    users: U,
    tracks: T,
}

impl<U, T> BookmarkResolver<U, T>
where
    U: UserStore,
    T: TrackStore,
{
    pub fn new(users: U, tracks: T) -> Self {
        Self { users, tracks }
    }

    /// Resolve one page of `user_id`'s bookmarks.
    ///
    /// `total_pages` and `total_bookmarks` count every bookmark the user has, including
    /// the ones hidden because their shipment was delivered.
    #[instrument(skip(self, user_id, page), fields(user_id = %user_id, page = page.number()), err)]
    pub async fn resolve_page(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<BookmarkPage, ResolveError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ResolveError::UserNotFound(user_id))?;

        let total_bookmarks = user.bookmarks.len();
        let slice = page.slice(&user.bookmarks);

        let resolved = try_join_all(
            slice
                .iter()
                .map(|bookmark| self.resolve_bookmark(&user, bookmark.clone())),
        )
        .await?;

        let items: Vec<_> = resolved
            .into_iter()
            .filter_map(ResolvedBookmark::into_visible)
            .collect();

        debug!(
            shown = items.len(),
            on_page = slice.len(),
            total_bookmarks,
            "bookmark page resolved"
        );

        Ok(BookmarkPage {
            items,
            total_pages: total_pages(total_bookmarks),
            total_bookmarks,
        })
    }

    async fn resolve_bookmark(
        &self,
        user: &User,
        bookmark: Bookmark,
    ) -> Result<ResolvedBookmark, ResolveError> {
        match bookmark.track_id {
            Some(track_id) => self.resolve_linked(user, bookmark, track_id).await,
            None => self.resolve_unlinked(user, bookmark).await,
        }
    }

    async fn resolve_unlinked(
        &self,
        user: &User,
        mut bookmark: Bookmark,
    ) -> Result<ResolvedBookmark, ResolveError> {
        let Some(mut track) = self.tracks.find_by_number(&bookmark.track_number).await? else {
            debug!(track_number = %bookmark.track_number, "no shipment for bookmark yet");
            return Ok(ResolvedBookmark::Stub(BookmarkStub::from(&bookmark)));
        };

        bookmark.track_id = Some(track.id);
        let linked = self
            .users
            .set_bookmark_track_id(user.id, &bookmark.track_number, track.id)
            .await?;
        info!(
            user_id = %user.id,
            track_number = %bookmark.track_number,
            track_id = %track.id,
            linked,
            "backfilled bookmark track id"
        );

        self.reconcile_owner(user, &mut track).await?;

        let populated = self
            .tracks
            .find_with_statuses(track.id)
            .await?
            .ok_or(ResolveError::DanglingTrack { track_id: track.id })?;
        Ok(classify(bookmark, populated))
    }

    async fn resolve_linked(
        &self,
        user: &User,
        bookmark: Bookmark,
        track_id: TrackId,
    ) -> Result<ResolvedBookmark, ResolveError> {
        let mut track = self
            .tracks
            .find_with_statuses(track_id)
            .await?
            .ok_or(ResolveError::DanglingTrack { track_id })?;

        self.reconcile_owner(user, &mut track).await?;
        Ok(classify(bookmark, track))
    }

    async fn reconcile_owner(&self, user: &User, track: &mut Track) -> Result<(), ResolveError> {
        let previous = track.user.clone();
        if track.reconcile_owner(&user.phone) {
            self.tracks.save(track).await?;
            info!(
                track_id = %track.id,
                previous_owner = previous.as_deref().unwrap_or(""),
                owner = %user.phone,
                "reconciled track owner"
            );
        }
        Ok(())
    }
}

fn classify(bookmark: Bookmark, track: Track) -> ResolvedBookmark {
    if track.is_delivered() {
        debug!(track_id = %track.id, "hiding delivered shipment");
        return ResolvedBookmark::Suppressed(bookmark);
    }
    ResolvedBookmark::Enriched(Box::new(EnrichedBookmark::new(bookmark, track)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use parcelmark_core::StatusId;
    use parcelmark_tracking::{DELIVERED_STATUS_TEXT, HistoryEntry, PAGE_SIZE, Status, VisibleBookmark};

    use super::*;
    use crate::store::{InMemoryTrackStore, InMemoryUserStore};

    struct Fixture {
        users: Arc<InMemoryUserStore>,
        tracks: Arc<InMemoryTrackStore>,
        in_transit: Status,
        delivered: Status,
    }

    impl Fixture {
        fn new() -> Self {
            let tracks = InMemoryTrackStore::arc();
            let in_transit = Status::new(StatusId::new(), "В пути");
            let delivered = Status::new(StatusId::new(), DELIVERED_STATUS_TEXT);
            tracks.insert_status(in_transit.clone());
            tracks.insert_status(delivered.clone());
            Self {
                users: InMemoryUserStore::arc(),
                tracks,
                in_transit,
                delivered,
            }
        }

        fn resolver(&self) -> BookmarkResolver<Arc<InMemoryUserStore>, Arc<InMemoryTrackStore>> {
            BookmarkResolver::new(self.users.clone(), self.tracks.clone())
        }

        fn track(&self, number: &str, delivered: bool) -> Track {
            let mut track = Track::new(TrackId::new(), number)
                .with_owner("+7001")
                .with_price(100.0)
                .with_weight(1.5)
                .with_history(HistoryEntry::new(self.in_transit.id, ts(0)));
            if delivered {
                track = track.with_history(HistoryEntry::new(self.delivered.id, ts(1)));
            }
            self.tracks.insert(track.clone());
            track
        }
    }

    fn ts(minutes: i64) -> DateTime<Utc> {
        "2024-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap() + Duration::minutes(minutes)
    }

    fn bookmark(number: &str) -> Bookmark {
        Bookmark::new(number, ts(0)).with_description(format!("посылка {number}"))
    }

    fn page(n: u64) -> PageRequest {
        PageRequest::new(n).unwrap()
    }

    fn numbers(page: &BookmarkPage) -> Vec<&str> {
        page.items.iter().map(VisibleBookmark::track_number).collect()
    }

    #[tokio::test]
    async fn second_page_of_fifteen_bookmarks() {
        let fx = Fixture::new();
        let mut user = User::new(UserId::new(), "+7001");
        for i in 1..=15 {
            let number = format!("RB{i:02}");
            let track = fx.track(&number, false);
            user = user.with_bookmark(bookmark(&number).with_track_id(track.id));
        }
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(2)).await.unwrap();
        assert_eq!(numbers(&result), vec!["RB11", "RB12", "RB13", "RB14", "RB15"]);
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.total_bookmarks, 15);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found_without_writes() {
        let fx = Fixture::new();
        let missing = UserId::new();
        let err = fx.resolver().resolve_page(missing, page(1)).await.unwrap_err();

        assert!(matches!(err, ResolveError::UserNotFound(id) if id == missing));
        assert_eq!(fx.users.write_count(), 0);
        assert_eq!(fx.tracks.write_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_tracking_number_yields_stub() {
        let fx = Fixture::new();
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB404"));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        match &result.items[..] {
            [VisibleBookmark::Stub(stub)] => {
                assert_eq!(stub.track_number, "RB404");
                assert_eq!(stub.description.as_deref(), Some("посылка RB404"));
            }
            other => panic!("expected a single stub, got {other:?}"),
        }
        assert_eq!(fx.users.write_count(), 0);
    }

    #[tokio::test]
    async fn delivered_shipments_are_hidden_but_counted() {
        let fx = Fixture::new();
        let live = fx.track("RB1", false);
        let done = fx.track("RB2", true);
        let user = User::new(UserId::new(), "+7001")
            .with_bookmark(bookmark("RB1").with_track_id(live.id))
            .with_bookmark(bookmark("RB2").with_track_id(done.id))
            .with_bookmark(bookmark("RB3"));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(numbers(&result), vec!["RB1", "RB3"]);
        assert_eq!(result.total_bookmarks, 3);
        assert_eq!(result.total_pages, 1);
    }

    #[tokio::test]
    async fn fully_delivered_page_is_empty_with_unchanged_totals() {
        let fx = Fixture::new();
        let mut user = User::new(UserId::new(), "+7001");
        for i in 0..PAGE_SIZE {
            let number = format!("RB{i}");
            let track = fx.track(&number, true);
            user = user.with_bookmark(bookmark(&number).with_track_id(track.id));
        }
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total_bookmarks, PAGE_SIZE);
        assert_eq!(result.total_pages, 1);
    }

    #[tokio::test]
    async fn page_beyond_range_is_empty() {
        let fx = Fixture::new();
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1"));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(7)).await.unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total_bookmarks, 1);
        assert_eq!(result.total_pages, 1);
    }

    #[tokio::test]
    async fn backfill_links_bookmark_and_next_request_uses_track_id() {
        let fx = Fixture::new();
        let track = fx.track("RB1", false);
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1"));
        let user_id = user.id;
        fx.users.insert(user);

        let first = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(fx.users.get(user_id).unwrap().bookmarks[0].track_id, Some(track.id));
        assert_eq!(fx.users.write_count(), 1);

        match &first.items[..] {
            [VisibleBookmark::Enriched(enriched)] => {
                assert_eq!(enriched.bookmark.track_id, Some(track.id));
                assert_eq!(enriched.price, Some(100.0));
                assert_eq!(enriched.weight, Some(1.5));
                assert_eq!(enriched.history.len(), 1);
                assert_eq!(
                    enriched.history[0].status.as_ref().and_then(|s| s.resolved()),
                    Some(&fx.in_transit)
                );
            }
            other => panic!("expected a single enriched bookmark, got {other:?}"),
        }

        let second = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(fx.users.write_count(), 1, "linked bookmark must not be backfilled again");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn backfilled_delivered_track_is_linked_and_hidden() {
        let fx = Fixture::new();
        let track = fx.track("RB1", true);
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1"));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert!(result.items.is_empty());
        assert_eq!(fx.users.get(user_id).unwrap().bookmarks[0].track_id, Some(track.id));
    }

    #[tokio::test]
    async fn owner_pointer_is_overwritten_when_missing_or_different() {
        let fx = Fixture::new();
        let foreign = Track::new(TrackId::new(), "RB1").with_owner("+7999");
        let orphan = Track::new(TrackId::new(), "RB2");
        fx.tracks.insert(foreign.clone());
        fx.tracks.insert(orphan.clone());
        let user = User::new(UserId::new(), "+7001")
            .with_bookmark(bookmark("RB1").with_track_id(foreign.id))
            .with_bookmark(bookmark("RB2"));
        let user_id = user.id;
        fx.users.insert(user);

        fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(fx.tracks.get(foreign.id).unwrap().user.as_deref(), Some("+7001"));
        assert_eq!(fx.tracks.get(orphan.id).unwrap().user.as_deref(), Some("+7001"));
        assert_eq!(fx.tracks.write_count(), 2);

        fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(fx.tracks.write_count(), 2, "matching owner must not be saved again");
    }

    #[tokio::test]
    async fn enriched_track_details_reflect_reconciled_owner() {
        let fx = Fixture::new();
        let track = Track::new(TrackId::new(), "RB1").with_owner("+7999");
        fx.tracks.insert(track.clone());
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1").with_track_id(track.id));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        match &result.items[..] {
            [VisibleBookmark::Enriched(enriched)] => {
                assert_eq!(enriched.track_details.user.as_deref(), Some("+7001"));
            }
            other => panic!("expected a single enriched bookmark, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn removed_status_never_counts_as_delivered() {
        let fx = Fixture::new();
        let track = fx.track("RB1", true);
        fx.tracks.remove_status(fx.delivered.id);
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1").with_track_id(track.id));
        let user_id = user.id;
        fx.users.insert(user);

        let result = fx.resolver().resolve_page(user_id, page(1)).await.unwrap();
        assert_eq!(numbers(&result), vec!["RB1"]);
    }

    #[tokio::test]
    async fn dangling_track_id_fails_the_page() {
        let fx = Fixture::new();
        let missing = TrackId::new();
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1").with_track_id(missing));
        let user_id = user.id;
        fx.users.insert(user);

        let err = fx.resolver().resolve_page(user_id, page(1)).await.unwrap_err();
        assert!(matches!(err, ResolveError::DanglingTrack { track_id } if track_id == missing));
    }

    /// Track store that serves reads from an in-memory store but refuses saves.
    struct FailingSaves {
        inner: Arc<InMemoryTrackStore>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TrackStore for FailingSaves {
        async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError> {
            self.inner.find_by_number(track_number).await
        }

        async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
            self.inner.find_with_statuses(id).await
        }

        async fn save(&self, _track: &Track) -> Result<(), StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_fails_whole_page_and_keeps_earlier_writes() {
        let fx = Fixture::new();
        let track = Track::new(TrackId::new(), "RB1");
        fx.tracks.insert(track.clone());
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1"));
        let user_id = user.id;
        fx.users.insert(user);

        let failing = FailingSaves {
            inner: fx.tracks.clone(),
            attempts: AtomicUsize::new(0),
        };
        let resolver = BookmarkResolver::new(fx.users.clone(), failing);

        let err = resolver.resolve_page(user_id, page(1)).await.unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::Unavailable(_))));
        assert_eq!(resolver.tracks.attempts.load(Ordering::SeqCst), 1);
        // The backfill ran before the failing save and is not rolled back.
        assert_eq!(fx.users.get(user_id).unwrap().bookmarks[0].track_id, Some(track.id));
    }

    /// Track store whose populated reads take longer the earlier the track was registered,
    /// so later bookmarks of a page finish first.
    struct SlowerFirst {
        inner: Arc<InMemoryTrackStore>,
        delays: HashMap<TrackId, u64>,
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TrackStore for SlowerFirst {
        async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError> {
            self.inner.find_by_number(track_number).await
        }

        async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
            let delay = self.delays.get(&id).copied().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            let track = self.inner.find_with_statuses(id).await?;
            if let Some(t) = &track {
                self.finished.lock().unwrap().push(t.track.clone());
            }
            Ok(track)
        }

        async fn save(&self, track: &Track) -> Result<(), StoreError> {
            self.inner.save(track).await
        }
    }

    #[tokio::test]
    async fn page_order_survives_out_of_order_completion() {
        let fx = Fixture::new();
        let mut user = User::new(UserId::new(), "+7001");
        let mut delays = HashMap::new();
        for i in 0..PAGE_SIZE as u64 {
            let number = format!("RB{i}");
            let track = fx.track(&number, false);
            delays.insert(track.id, (PAGE_SIZE as u64 - i) * 15);
            user = user.with_bookmark(bookmark(&number).with_track_id(track.id));
        }
        let user_id = user.id;
        fx.users.insert(user);

        let slow = SlowerFirst {
            inner: fx.tracks.clone(),
            delays,
            finished: Mutex::new(Vec::new()),
        };
        let resolver = BookmarkResolver::new(fx.users.clone(), slow);

        let result = resolver.resolve_page(user_id, page(1)).await.unwrap();
        let expected: Vec<String> = (0..PAGE_SIZE).map(|i| format!("RB{i}")).collect();
        assert_eq!(numbers(&result), expected.iter().map(String::as_str).collect::<Vec<_>>());

        let finished = resolver.tracks.finished.lock().unwrap().clone();
        let reversed: Vec<String> = expected.iter().rev().cloned().collect();
        assert_eq!(finished, reversed, "lookups should complete last-to-first");
    }

    #[tokio::test]
    async fn works_through_trait_objects() {
        let fx = Fixture::new();
        let user = User::new(UserId::new(), "+7001").with_bookmark(bookmark("RB1"));
        let user_id = user.id;
        fx.users.insert(user);

        let users: Arc<dyn UserStore> = fx.users.clone();
        let tracks: Arc<dyn TrackStore> = fx.tracks.clone();
        let resolver = BookmarkResolver::new(users, tracks);

        let result = resolver.resolve_page(user_id, PageRequest::first()).await.unwrap();
        assert_eq!(result.items.len(), 1);
    }
}
