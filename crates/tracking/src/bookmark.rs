//! Per-bookmark resolution outcomes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::track::{HistoryEntry, Track};
use crate::user::Bookmark;

/// Bookmark whose tracking number has no shipment record yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkStub {
    pub track_number: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Bookmark> for BookmarkStub {
    fn from(bookmark: &Bookmark) -> Self {
        Self {
            track_number: bookmark.track_number.clone(),
            created_at: bookmark.created_at,
            description: bookmark.description.clone(),
        }
    }
}

/// Bookmark joined with its shipment record.
///
/// `history`, `price` and `weight` repeat fields of `track_details` at the top level for
/// clients that render the list without descending into the track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedBookmark {
    #[serde(flatten)]
    pub bookmark: Bookmark,
    pub track_details: Track,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl EnrichedBookmark {
    pub fn new(bookmark: Bookmark, track: Track) -> Self {
        Self {
            bookmark,
            history: track.history.clone(),
            price: track.price,
            weight: track.weight,
            track_details: track,
        }
    }
}

/// Outcome of resolving one bookmark.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBookmark {
    /// No shipment record exists for the tracking number.
    Stub(BookmarkStub),
    /// Shipment record found and still in flight.
    Enriched(Box<EnrichedBookmark>),
    /// Shipment already delivered; hidden from the page.
    Suppressed(Bookmark),
}

impl ResolvedBookmark {
    pub fn into_visible(self) -> Option<VisibleBookmark> {
        match self {
            ResolvedBookmark::Stub(stub) => Some(VisibleBookmark::Stub(stub)),
            ResolvedBookmark::Enriched(enriched) => Some(VisibleBookmark::Enriched(enriched)),
            ResolvedBookmark::Suppressed(_) => None,
        }
    }
}

/// A bookmark as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VisibleBookmark {
    Stub(BookmarkStub),
    Enriched(Box<EnrichedBookmark>),
}

impl VisibleBookmark {
    pub fn track_number(&self) -> &str {
        match self {
            VisibleBookmark::Stub(stub) => &stub.track_number,
            VisibleBookmark::Enriched(enriched) => &enriched.bookmark.track_number,
        }
    }
}
