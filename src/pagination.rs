//! Offset pagination shared by every list query.
//!
//! The count and the page are always computed against the same WHERE
//! predicate, so `total_count` and `has_more` can never disagree with the
//! returned rows.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 24;
pub const MAX_PER_PAGE: i64 = 2400;

/// Validated page request. `page` starts at 1.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    /// Check bounds: page >= 1, per_page in 1..=2400.
    pub fn validate(&self) -> Result<(), String> {
        if self.page < 1 {
            return Err(format!("page must be >= 1, got {}", self.page));
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            return Err(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, self.per_page
            ));
        }
        Ok(())
    }

    /// Saturates instead of overflowing: an absurdly large page clamps to
    /// i64::MAX, which lands past the end of any result set and yields the
    /// usual empty page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub has_more: bool,
}

impl PageMeta {
    /// Build meta from the request, the unpaginated count and the number
    /// of rows actually returned for this page.
    pub fn new(req: &PageRequest, total_count: i64, returned: usize) -> Self {
        Self {
            page: req.page,
            per_page: req.per_page,
            total_count,
            has_more: req.offset().saturating_add(returned as i64) < total_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, meta: PageMeta) -> Self {
        Self { data, meta }
    }
}
