//! Paged query results.
//!
//! [`Query::page`](crate::query::Query::page) counts the matching documents, then
//! fetches one window of them with `skip`/`limit` and wraps it in a [`Page`].

use serde::{Deserialize, Serialize};

/// A single page of query results.
///
/// # Example
///
/// ```ignore
/// use docmodel::page::{Page, PaginationParams};
///
/// let page = people.query().asc(&["name"]).page(PaginationParams::new(2, 20)).await?;
///
/// assert_eq!(page.previous_page, Some(1));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total number of matching documents across all pages.
    pub count: u64,
    /// The next page number, if more pages exist.
    pub next_page: Option<u64>,
    /// The previous page number, if this is not the first page.
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Converts the items of this page, keeping the navigation metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to fetch and how many documents per page.
///
/// Pages are 1-indexed; a page number of 0 is treated as 1.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: u64,
    pub per_page: u64,
}

impl PaginationParams {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    pub fn builder() -> PaginationParamsBuilder {
        PaginationParamsBuilder::new()
    }

    /// The number of documents to skip to reach this page.
    ///
    /// ```ignore
    /// assert_eq!(PaginationParams::new(3, 20).offset(), 40);
    /// ```
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Wraps one fetched window of `items` out of `count` matches in a [`Page`].
    pub fn page_of<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let page = self.page.max(1);
        let end = self.offset().saturating_add(items.len() as u64);

        Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then_some(page + 1))
            .with_previous_page((page > 1).then(|| page - 1))
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

/// Builder for [`PaginationParams`]. Unset values default to page 1 of 10.
#[derive(Default)]
pub struct PaginationParamsBuilder {
    page: Option<u64>,
    per_page: Option<u64>,
}

impl PaginationParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_per_page(mut self, per_page: u64) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn build(self) -> PaginationParams {
        PaginationParams {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(10),
        }
    }
}
