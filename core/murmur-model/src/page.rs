use serde::{Deserialize, Serialize};

/// One page of a locally sorted collection. Pages are numbered from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole collection, not of this page.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    /// An empty page.
    pub fn empty(page: usize, page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }

    /// True if later pages hold more items.
    pub fn has_more(&self) -> bool {
        (self.page + 1).saturating_mul(self.page_size) < self.total
    }
}
