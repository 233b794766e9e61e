//! Regex filtering and page/limit slicing for name listings.

use regex::Regex;

use crate::{Error, Result};

/// Default page size for metric name listings.
pub const METRIC_NAME_LIMIT: usize = 10;
/// Default page size for label name and value listings.
pub const LABEL_LIMIT: usize = 100;

/// One-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Page {
    /// Zero or missing values fall back to page 1 and `default_limit`.
    pub fn new(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.filter(|l| *l > 0).unwrap_or(default_limit),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Keep items matching `pattern` (unanchored), then return the requested page.
///
/// An empty pattern is treated as no pattern.
pub fn filter_and_page(items: Vec<String>, pattern: Option<&str>, page: Page) -> Result<Vec<String>> {
    let filtered = match pattern.filter(|p| !p.is_empty()) {
        Some(pattern) => {
            let re = Regex::new(pattern).map_err(|source| Error::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
            items.into_iter().filter(|item| re.is_match(item)).collect()
        }
        None => items,
    };

    let offset = page.offset();
    if offset >= filtered.len() {
        return Ok(Vec::new());
    }
    Ok(filtered.into_iter().skip(offset).take(page.limit).collect())
}
