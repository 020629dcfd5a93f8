use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parcelmark_core::{Entity, StatusId, TrackId};

/// Status text marking a shipment as received by its recipient (terminal state).
pub const DELIVERED_STATUS_TEXT: &str = "Получено";

/// Shipment status as referenced from a track's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(rename = "_id")]
    pub id: StatusId,
    pub status_text: String,
}

impl Status {
    pub fn new(id: StatusId, status_text: impl Into<String>) -> Self {
        Self {
            id,
            status_text: status_text.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status_text == DELIVERED_STATUS_TEXT
    }
}

impl Entity for Status {
    type Id = StatusId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Reference from a history entry to its status.
///
/// Tracks loaded plainly carry `Id`; tracks loaded with their statuses joined carry
/// `Resolved`. Serialized untagged, so clients see either the bare id or the status object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusRef {
    Resolved(Status),
    Id(StatusId),
}

impl StatusRef {
    pub fn id(&self) -> StatusId {
        match self {
            StatusRef::Resolved(status) => status.id,
            StatusRef::Id(id) => *id,
        }
    }

    pub fn resolved(&self) -> Option<&Status> {
        match self {
            StatusRef::Resolved(status) => Some(status),
            StatusRef::Id(_) => None,
        }
    }
}

/// One timestamped status update on a shipment.
///
/// `status` is `None` when the entry has no status, or when a join could not resolve the
/// referenced status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: Option<StatusRef>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(status: StatusId, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: Some(StatusRef::Id(status)),
            timestamp,
        }
    }

    /// Drop a joined status back to its bare reference.
    pub fn unpopulated(&self) -> Self {
        Self {
            status: self.status.as_ref().map(|s| StatusRef::Id(s.id())),
            timestamp: self.timestamp,
        }
    }
}

/// Canonical shipment record.
///
/// `user` is a denormalized pointer to the owning user's phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_id")]
    pub id: TrackId,
    pub track: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Track {
    pub fn new(id: TrackId, track: impl Into<String>) -> Self {
        Self {
            id,
            track: track.into(),
            user: None,
            price: None,
            weight: None,
            history: Vec::new(),
        }
    }

    pub fn with_owner(mut self, phone: impl Into<String>) -> Self {
        self.user = Some(phone.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_history(mut self, entry: HistoryEntry) -> Self {
        self.history.push(entry);
        self
    }

    /// Whether any joined history status is the terminal "received" status.
    ///
    /// Unresolved references never count as delivered.
    pub fn is_delivered(&self) -> bool {
        self.history.iter().any(|entry| {
            entry
                .status
                .as_ref()
                .and_then(StatusRef::resolved)
                .is_some_and(Status::is_delivered)
        })
    }

    /// Point the track at `phone` unless it already does.
    ///
    /// An empty owner always counts as a mismatch. Returns `true` when the record changed
    /// and needs saving.
    pub fn reconcile_owner(&mut self, phone: &str) -> bool {
        let matches = self
            .user
            .as_deref()
            .is_some_and(|owner| !owner.is_empty() && owner == phone);
        if matches {
            return false;
        }
        self.user = Some(phone.to_string());
        true
    }
}

impl Entity for Track {
    type Id = TrackId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
