//! Bookmark pagination.
//!
//! Page numbers are 1-based and the page size is fixed. Totals are always computed over the
//! user's full bookmark list, before delivered shipments are hidden, so a page may show
//! fewer entries than `PAGE_SIZE` (or none) while `total_pages` still counts it.

use parcelmark_core::{DomainError, DomainResult};

use crate::bookmark::VisibleBookmark;

/// Number of bookmarks per page.
pub const PAGE_SIZE: usize = 10;

/// Validated 1-based page number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
}

impl PageRequest {
    pub fn new(page: u64) -> DomainResult<Self> {
        if page == 0 {
            return Err(DomainError::validation("page must be a positive integer"));
        }
        Ok(Self { page })
    }

    pub fn first() -> Self {
        Self { page: 1 }
    }

    /// Parse a raw `page` query value, falling back to the first page.
    ///
    /// Reads the leading integer after optional whitespace and `+`, ignoring whatever follows
    /// (`"2.5"` is page 2, `"3abc"` is page 3). Missing, empty, non-numeric, zero and negative
    /// values all mean page 1. Digit runs too large for `u64` saturate.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(leading_integer)
            .and_then(|page| Self::new(page).ok())
            .unwrap_or_else(Self::first)
    }

    pub fn number(&self) -> u64 {
        self.page
    }

    /// Index of the first bookmark on this page.
    pub fn skip(&self) -> usize {
        usize::try_from(self.page - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(PAGE_SIZE)
    }

    /// The part of `items` covered by this page; empty past the end.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.skip().min(items.len());
        let end = start.saturating_add(PAGE_SIZE).min(items.len());
        &items[start..end]
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

fn leading_integer(raw: &str) -> Option<u64> {
    let rest = raw.trim_start();
    let rest = rest.strip_prefix('+').unwrap_or(rest);
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}

/// Number of pages needed for `total` bookmarks.
pub fn total_pages(total: usize) -> usize {
    total.div_ceil(PAGE_SIZE)
}

/// One page of a user's bookmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkPage {
    pub items: Vec<VisibleBookmark>,
    pub total_pages: usize,
    pub total_bookmarks: usize,
}
