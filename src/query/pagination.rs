//! Pagination arithmetic shared by every adapter.

use serde::{Deserialize, Serialize};

/// One page of results plus the counts needed to render paging controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetManyResult<T> {
    pub data: Vec<T>,
    pub count: u64,
    pub total: u64,
    pub page: u64,
    pub page_count: u64,
}

impl<T> GetManyResult<T> {
    /// Transform every row, keeping the counts.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> GetManyResult<U> {
        GetManyResult {
            data: self.data.into_iter().map(f).collect(),
            count: self.count,
            total: self.total,
            page: self.page,
            page_count: self.page_count,
        }
    }
}

/// Resolve the row offset. An explicit offset wins; otherwise `limit * page`
/// when both are present, else 0.
///
/// `page` is multiplied as given, so page 2 with limit 25 starts at row 50.
pub fn effective_offset(offset: Option<u64>, limit: Option<u64>, page: Option<u64>) -> u64 {
    match (offset, limit, page) {
        (Some(offset), _, _) => offset,
        (None, Some(limit), Some(page)) => limit.saturating_mul(page),
        _ => 0,
    }
}

/// Shape a page of rows. A missing limit means "everything", so the page size
/// falls back to `total`; a zero page size yields page 1 of 0.
pub fn shape_result<T>(data: Vec<T>, total: u64, offset: u64, limit: Option<u64>) -> GetManyResult<T> {
    let page_size = limit.unwrap_or(total);
    let (page, page_count) = if page_size > 0 {
        (offset / page_size + 1, total.div_ceil(page_size))
    } else {
        (1, 0)
    };

    GetManyResult {
        count: data.len() as u64,
        data,
        total,
        page,
        page_count,
    }
}
