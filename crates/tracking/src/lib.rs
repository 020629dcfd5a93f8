//! Shipment tracking domain: users with bookmarked tracking numbers, shipment records with
//! their status history, and the per-bookmark resolution outcomes served to clients.

pub mod bookmark;
pub mod page;
pub mod track;
pub mod user;

pub use bookmark::{BookmarkStub, EnrichedBookmark, ResolvedBookmark, VisibleBookmark};
pub use page::{BookmarkPage, PAGE_SIZE, PageRequest, total_pages};
pub use track::{DELIVERED_STATUS_TEXT, HistoryEntry, Status, StatusRef, Track};
pub use user::{Bookmark, User};
