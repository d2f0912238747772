//! Paging DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use gatehouse_db::{Page, Pagination};

/// `?page=&limit=&name=`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PageQuery {
    /// 1-indexed
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: u32,
    /// Case-insensitive substring filter
    pub name: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl<T> PageResponse<T> {
    pub fn new<U: Into<T>>(page: Page<U>, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.page) * u64::from(pagination.limit) < page.total;
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            total: page.total,
            page: pagination.page,
            limit: pagination.limit,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
        };
        let response: PageResponse<i32> = PageResponse::new(page, Pagination::new(1, 2));
        assert!(response.has_more);

        let page = Page {
            items: vec![5],
            total: 5,
        };
        let response: PageResponse<i32> = PageResponse::new(page, Pagination::new(3, 2));
        assert!(!response.has_more);
    }
}
