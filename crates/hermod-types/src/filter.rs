//! Shared `List` filter/page types (spec §4.1: "Filters share: `page`,
//! `limit`, `search` ..., optional `vhost` and `workspace_id`, time
//! bounds for logs/traces").

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub vhost: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ListFilter {
    pub fn offset(&self) -> u32 {
        self.page.saturating_mul(self.limit)
    }
}

/// A page of `List` results alongside the total matching count, so
/// callers can compute whether more pages remain without a second
/// round trip.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_page_times_limit() {
        let f = ListFilter {
            page: 2,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(f.offset(), 40);
    }
}
