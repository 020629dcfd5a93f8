use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parcelmark_core::{Entity, TrackId, UserId};

/// A user's saved reference to a shipment tracking number.
///
/// `track_id` caches the identity of the matching `Track` once one is known. Legacy entries
/// (or entries saved before the shipment was ingested) carry no `track_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub track_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Bookmark {
    pub fn new(track_number: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            track_number: track_number.into(),
            track_id: None,
            created_at,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_track_id(mut self, track_id: TrackId) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// User account as far as bookmarks are concerned.
///
/// `bookmarks` is insertion-ordered; that order is the pagination order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub phone: String,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

impl User {
    pub fn new(id: UserId, phone: impl Into<String>) -> Self {
        Self {
            id,
            phone: phone.into(),
            bookmarks: Vec::new(),
        }
    }

    pub fn with_bookmark(mut self, bookmark: Bookmark) -> Self {
        self.bookmarks.push(bookmark);
        self
    }

    /// Link the first bookmark carrying `track_number` to `track_id`.
    ///
    /// Returns `false` when no bookmark matches. Only the first match is touched, the same
    /// way a positional update addresses the first matching array element.
    pub fn link_bookmark(&mut self, track_number: &str, track_id: TrackId) -> bool {
        match self
            .bookmarks
            .iter_mut()
            .find(|b| b.track_number == track_number)
        {
            Some(bookmark) => {
                bookmark.track_id = Some(track_id);
                true
            }
            None => false,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
