pub mod dashboard;
pub mod filters;
pub mod records;
pub mod report;
pub mod report_data;
pub mod schedule;
pub mod template;

pub use dashboard::*;
pub use filters::*;
pub use records::*;
pub use report::*;
pub use report_data::*;
pub use schedule::*;
pub use template::*;

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamps caller-supplied paging to sane bounds.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Applies offset/limit to an already filtered and ordered slice.
pub fn paginate<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_defaults() {
        assert_eq!(page_bounds(None, None), (20, 0));
    }

    #[test]
    fn test_page_bounds_clamps() {
        assert_eq!(page_bounds(Some(500), Some(-3)), (100, 0));
        assert_eq!(page_bounds(Some(0), Some(7)), (1, 7));
    }

    #[test]
    fn test_paginate_window() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(paginate(&items, 3, 4), vec![4, 5, 6]);
        assert!(paginate(&items, 3, 20).is_empty());
    }
}
