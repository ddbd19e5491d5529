//! Query execution: filtered, paginated reads with consistent counts

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::{CollectionId, DocumentStore};

use super::Filter;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 50;

/// Hard cap on page size to bound response cost
pub const MAX_LIMIT: u64 = 500;

/// Pagination metadata computed from the same filter set as the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

/// One page of merged record views plus pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub records: Vec<Value>,
    pub pagination: Pagination,
}

/// Parse a `page` parameter; malformed values fall back to the default
pub fn parse_page_param(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PAGE)
}

/// Parse a `limit` parameter; malformed values fall back to the default
pub fn parse_limit_param(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_LIMIT)
}

/// Run one coherent read: page of matches plus the total cardinality of
/// the identical filter set, so `ceil(total / limit)` is exactly the
/// number of pages needed to enumerate every match.
pub fn list<S>(
    store: &S,
    collection: CollectionId,
    filters: &[Filter],
    page: u64,
    limit: u64,
) -> Result<RecordPage>
where
    S: DocumentStore + ?Sized,
{
    let page = page.max(DEFAULT_PAGE);
    let limit = limit.clamp(1, MAX_LIMIT);
    let offset = (page - 1) * limit;

    let items = store.select_many(collection, filters, limit as usize, offset as usize)?;
    let total = store.count(collection, filters)? as u64;
    let pages = (total + limit - 1) / limit;

    Ok(RecordPage {
        records: items.iter().map(|record| record.merged()).collect(),
        pagination: Pagination {
            total,
            page,
            limit,
            pages,
        },
    })
}
