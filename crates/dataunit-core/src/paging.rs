//! Paged query results.

use serde::Serialize;

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Rows matching the filter across all pages.
    pub total: i64,
    /// One-based page number.
    pub page: i64,
    pub page_size: i64,
}

impl<T> PagedResult<T> {
    /// Pages are numbered from one; anything lower is treated as page one.
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        Self {
            items,
            total,
            page: page.max(1),
            page_size,
        }
    }

    /// Number of pages.
    ///
    /// A page size of one yields `total`; a page size below one yields `-1`.
    pub fn page_count(&self) -> i64 {
        match self.page_size {
            size if size > 1 => ((self.total - 1) / size) + 1,
            1 => self.total,
            _ => -1,
        }
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size.max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(total: i64, page_size: i64) -> PagedResult<()> {
        PagedResult::new(Vec::new(), total, 1, page_size)
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(paged(11, 5).page_count(), 3);
        assert_eq!(paged(10, 5).page_count(), 2);
    }

    #[test]
    fn page_count_single_row_pages() {
        assert_eq!(paged(23, 1).page_count(), 23);
    }

    #[test]
    fn page_count_without_page_size() {
        assert_eq!(paged(523, 0).page_count(), -1);
        assert_eq!(paged(523, -3).page_count(), -1);
    }

    #[test]
    fn offset_counts_pages_from_one() {
        let page = PagedResult::new(vec![1, 2], 12, 3, 5);
        assert_eq!(page.offset(), 10);
        assert_eq!(PagedResult::<()>::new(Vec::new(), 12, 1, 5).offset(), 0);
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({"items": [1, 2], "total": 12, "page": 3, "page_size": 5})
        );
    }

    #[test]
    fn pages_below_one_clamp_to_first() {
        let page = PagedResult::<()>::new(Vec::new(), 12, 0, 5);
        assert_eq!(page.page, 1);
        assert_eq!(page.offset(), 0);
        assert_eq!(PagedResult::<()>::new(Vec::new(), 12, -4, 5).page, 1);
    }
}
