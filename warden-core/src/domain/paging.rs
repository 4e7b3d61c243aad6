// warden-core/src/domain/paging.rs

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    /// Matching items before paging.
    pub total: usize,
}

impl<T> Page<T> {
    /// Cuts `[offset, offset + limit)` out of an already filtered and ordered list.
    pub fn slice(all: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = all.len();
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let items = all.into_iter().skip(offset).take(limit).collect();
        Self {
            items,
            offset,
            limit,
            total,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_reports_total() {
        let page = Page::slice((0..12).collect::<Vec<_>>(), 10, 5);
        assert_eq!(page.items, vec![10, 11]);
        assert_eq!(page.total, 12);
        assert!(!page.has_more());

        let first = Page::slice((0..12).collect::<Vec<_>>(), 0, 0);
        assert_eq!(first.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(first.items.len(), 12);
    }
}
