//! Offset/limit pagination
//!
//! List endpoints are asked for `limit + 1` items; the extra item only
//! tells whether a next page exists and is dropped before returning.

use crate::types::Paginated;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 50;

/// Position in a paginated list
///
/// `limit` is always at least 1 and `offset` never goes below 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    offset: u32,
    limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

impl Pagination {
    pub fn new(limit: u32) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    pub fn with_offset(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of items to request from the server
    pub fn fetch_limit(&self) -> u32 {
        self.limit.saturating_add(1)
    }

    pub fn next(&mut self) {
        self.offset = self.offset.saturating_add(self.limit);
    }

    pub fn prev(&mut self) {
        self.offset = self.offset.saturating_sub(self.limit);
    }

    pub fn first(&mut self) {
        self.offset = 0;
    }

    /// Change the page size and go back to the first page
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit.max(1);
        self.offset = 0;
    }

    /// Turn a `limit + 1` response into a page
    pub fn paginate<T>(&self, mut items: Vec<T>) -> Paginated<T> {
        let limit = self.limit as usize;
        let next = items.len() > limit;
        items.truncate(limit);
        Paginated { items, next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_never_zero() {
        assert_eq!(Pagination::new(0).limit(), 1);
        let mut page = Pagination::new(10);
        page.set_limit(0);
        assert_eq!(page.limit(), 1);
    }

    #[test]
    fn test_navigation() {
        let mut page = Pagination::new(10);
        page.next();
        page.next();
        assert_eq!(page.offset(), 20);

        page.prev();
        assert_eq!(page.offset(), 10);

        page.prev();
        page.prev();
        assert_eq!(page.offset(), 0);

        page.next();
        page.first();
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_set_limit_rewinds() {
        let mut page = Pagination::with_offset(40, 20);
        page.set_limit(5);
        assert_eq!(page.offset(), 0);
        assert_eq!(page.limit(), 5);
    }

    #[test]
    fn test_paginate_pops_extra_item() {
        let page = Pagination::new(3);
        assert_eq!(page.fetch_limit(), 4);

        let result = page.paginate(vec![1, 2, 3, 4]);
        assert_eq!(result.items, vec![1, 2, 3]);
        assert!(result.next);

        let result = page.paginate(vec![1, 2, 3]);
        assert_eq!(result.items, vec![1, 2, 3]);
        assert!(!result.next);

        let result = page.paginate(Vec::<i32>::new());
        assert!(result.items.is_empty());
        assert!(!result.next);
    }
}
