use crate::config::RecordDefaults;
use serde::{Deserialize, Serialize};

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::clamped(None, None, &RecordDefaults::default())
    }
}

impl Pagination {
    /// Missing or zero values fall back to page 1 and the default page size;
    /// the limit is capped at the configured maximum.
    pub fn clamped(page: Option<usize>, limit: Option<usize>, defaults: &RecordDefaults) -> Self {
        let page = page.filter(|&p| p > 0).unwrap_or(1);
        let limit = limit
            .filter(|&l| l > 0)
            .unwrap_or(defaults.page_size)
            .min(defaults.max_page_size.max(1));
        Self { page, limit }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "data")]
    pub rows: Vec<T>,
    #[serde(rename = "pagination")]
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Cut one page out of an already ordered result set.
    pub fn slice(rows: Vec<T>, pagination: Pagination) -> Self {
        let total = rows.len();
        let offset = pagination.offset();
        let rows: Vec<T> = rows.into_iter().skip(offset).take(pagination.limit).collect();
        Self {
            rows,
            meta: PageMeta {
                page: pagination.page,
                limit: pagination.limit,
                total,
                has_more: offset.saturating_add(pagination.limit) < total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let defaults = RecordDefaults::default();
        assert_eq!(Pagination::clamped(None, None, &defaults), Pagination { page: 1, limit: 50 });
        assert_eq!(Pagination::clamped(Some(0), Some(0), &defaults), Pagination { page: 1, limit: 50 });
        assert_eq!(Pagination::clamped(Some(3), Some(10_000), &defaults), Pagination { page: 3, limit: 500 });
        assert_eq!(Pagination { page: 3, limit: 20 }.offset(), 40);
    }

    #[test]
    fn test_slice_meta() {
        let rows: Vec<u32> = (0..25).collect();
        let first = Page::slice(rows.clone(), Pagination { page: 1, limit: 10 });
        assert_eq!(first.rows, (0..10).collect::<Vec<_>>());
        assert_eq!(first.meta, PageMeta { page: 1, limit: 10, total: 25, has_more: true });

        let last = Page::slice(rows.clone(), Pagination { page: 3, limit: 10 });
        assert_eq!(last.rows, (20..25).collect::<Vec<_>>());
        assert!(!last.meta.has_more);

        let past = Page::slice(rows, Pagination { page: 9, limit: 10 });
        assert!(past.rows.is_empty());
        assert_eq!(past.meta.total, 25);
    }

    #[test]
    fn test_wire_shape() {
        let page = Page::slice(vec!["a"], Pagination { page: 1, limit: 50 });
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["data"][0], "a");
        assert_eq!(json["pagination"]["hasMore"], false);
    }
}
