use parcelmark_tracking::{BookmarkPage, PageRequest};

// -------------------------
// Request DTOs
// -------------------------

/// Query string of the bookmarks listing.
///
/// Built from the raw key/value pairs so no query string is ever rejected: `page` stays a
/// raw string, malformed values fall back to the first page, and when the key repeats the
/// first occurrence wins.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BookmarksQuery {
    pub page: Option<String>,
}

impl BookmarksQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let page = pairs
            .into_iter()
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value);
        Self { page }
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref())
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn bookmark_page_to_json(page: BookmarkPage) -> serde_json::Value {
    serde_json::json!({
        "updatedBookmarks": page.items,
        "totalPages": page.total_pages,
        "totalBookmarks": page.total_bookmarks,
    })
}
