//! Cursor-based pagination shared by every list operation.
//!
//! Records carry a backend-assigned, monotonically increasing insertion
//! sequence. Pages are ordered by that sequence and the cursor is an
//! exclusive lower bound on it, so an insert that lands after a page was
//! served can never duplicate an already-returned record on the next page.

use crate::constants::system;
use serde::{Deserialize, Serialize};

/// Pagination parameters embedded in every list filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return; clamped to `MAX_PAGE_SIZE`.
    pub size: u32,
    /// Exclusive lower bound on the insertion sequence; `None` starts from
    /// the beginning.
    pub cursor: Option<i64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            size: system::DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

impl Pagination {
    pub fn with_size(size: u32) -> Self {
        Self { size, cursor: None }
    }

    pub fn after(cursor: i64, size: u32) -> Self {
        Self {
            size,
            cursor: Some(cursor),
        }
    }

    /// Effective page size after clamping.
    pub fn limit(&self) -> u32 {
        self.size.clamp(1, system::MAX_PAGE_SIZE)
    }
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of records matching the filter, across all pages.
    pub total: u64,
    /// Page size that was applied.
    pub size: u32,
    /// Cursor for the next page; `None` when this page is the last.
    pub next_cursor: Option<i64>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
