//! Page-number pagination for list endpoints
//!
//! Raw `page`/`limit` values are clamped, never rejected: a garbage page is
//! page 1, a limit outside `[1, max_limit]` is pulled into range, and a
//! missing or unparseable limit uses the configured default.
//!
//! # Example
//!
//! ```rust
//! use gigbook_service::pagination::Paginator;
//!
//! let paginator = Paginator::new(20, 100);
//! let spec = paginator.resolve(Some("3"), Some("10"));
//!
//! let items: Vec<u32> = (1..=25).collect();
//! let page = paginator.apply(items, spec);
//!
//! assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
//! assert_eq!(page.meta.total_pages, 3);
//! assert!(!page.meta.has_next);
//! assert!(page.meta.has_previous);
//! ```

use std::future::Future;

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

/// Current page number header
pub const X_PAGE: &str = "x-page";
/// Page size header
pub const X_LIMIT: &str = "x-limit";
/// Total item count header
pub const X_TOTAL: &str = "x-total";
/// Total page count header
pub const X_TOTAL_PAGES: &str = "x-total-pages";
/// Next-page flag header
pub const X_HAS_NEXT: &str = "x-has-next";
/// Previous-page flag header
pub const X_HAS_PREVIOUS: &str = "x-has-previous";

/// A validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// Page number, 1-indexed
    pub page: u32,
    /// Items per page
    pub limit: u32,
}

impl PageSpec {
    /// Number of items before this page
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Items per page
    pub limit: u32,
    /// Total number of items across all pages
    pub total: u64,
    /// Total number of pages
    pub total_pages: u64,
    /// Whether there is a next page
    pub has_next: bool,
    /// Whether there is a previous page
    pub has_previous: bool,
}

impl PageMeta {
    /// Derive page metadata from a spec and the total item count
    #[must_use]
    pub fn new(spec: PageSpec, total: u64) -> Self {
        let limit = spec.limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit));

        Self {
            page: spec.page,
            limit,
            total,
            total_pages,
            has_next: u64::from(spec.page) < total_pages,
            has_previous: spec.page > 1,
        }
    }

    /// Write the `X-Page`, `X-Limit`, `X-Total`, `X-Total-Pages`,
    /// `X-Has-Next` and `X-Has-Previous` headers
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_PAGE, HeaderValue::from(self.page));
        headers.insert(X_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_TOTAL, HeaderValue::from(self.total));
        headers.insert(X_TOTAL_PAGES, HeaderValue::from(self.total_pages));
        headers.insert(X_HAS_NEXT, bool_header(self.has_next));
        headers.insert(X_HAS_PREVIOUS, bool_header(self.has_previous));
    }
}

fn bool_header(value: bool) -> HeaderValue {
    HeaderValue::from_static(if value { "true" } else { "false" })
}

/// One page of results with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Items on this page, at most `meta.limit` of them
    pub data: Vec<T>,
    /// Pagination metadata
    pub meta: PageMeta,
}

impl<T> PageResult<T> {
    /// Transform the items while keeping the metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PageResult<U> {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// A store that can return one page and the total count from a single read
///
/// Implementations must derive `rows` and `total` from the same snapshot of
/// the data. Stores without snapshot reads (e.g. a count query followed by a
/// page query under concurrent writes) can report a total that disagrees
/// with the rows; that race belongs to the store.
pub trait PagedSource<T>: Send + Sync {
    /// Error raised by the store
    type Error;

    /// Fetch up to `limit` rows starting at `offset`, plus the total row count
    fn fetch_page(
        &self,
        offset: u64,
        limit: u32,
    ) -> impl Future<Output = Result<(Vec<T>, u64), Self::Error>> + Send;
}

/// Resolves page specs and slices collections into pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    default_limit: u32,
    max_limit: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::from_config(&PaginationConfig::default())
    }
}

impl Paginator {
    /// Create a paginator; `max_limit` is at least 1 and the default lies within it
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    /// Build from configuration
    pub fn from_config(config: &PaginationConfig) -> Self {
        Self::new(config.default_limit, config.max_limit)
    }

    /// Largest page size accepted
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Resolve raw query values into a page spec
    pub fn resolve(&self, raw_page: Option<&str>, raw_limit: Option<&str>) -> PageSpec {
        let page = raw_page.and_then(parse_integer);
        let limit = raw_limit.and_then(parse_integer);
        self.resolve_values(page, limit)
    }

    /// Resolve already-parsed values into a page spec
    pub fn resolve_values(&self, page: Option<i64>, limit: Option<i64>) -> PageSpec {
        let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX));
        let limit = limit
            .map(|l| l.clamp(1, i64::from(self.max_limit)))
            .unwrap_or(i64::from(self.default_limit));

        // Both values were clamped into u32 range above
        PageSpec {
            page: u32::try_from(page).unwrap_or(1),
            limit: u32::try_from(limit).unwrap_or(self.default_limit),
        }
    }

    /// Slice an in-memory collection into the requested page
    ///
    /// A page past the end yields empty `data` with accurate metadata.
    pub fn apply<T>(&self, items: Vec<T>, spec: PageSpec) -> PageResult<T> {
        let total = items.len() as u64;
        let start = usize::try_from(spec.offset()).unwrap_or(usize::MAX);

        let data: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(spec.limit as usize)
            .collect();

        PageResult {
            data,
            meta: PageMeta::new(spec, total),
        }
    }

    /// Paginate the result of a deferred fetch
    ///
    /// `fetch` is awaited exactly once; the page and the total both derive from
    /// that one result, so they always describe the same data. Errors from the
    /// fetch are returned unchanged.
    pub async fn apply_deferred<T, E, F, Fut>(
        &self,
        fetch: F,
        spec: PageSpec,
    ) -> Result<PageResult<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let items = fetch().await?;
        Ok(self.apply(items, spec))
    }

    /// Paginate using a store that pages on its side
    pub async fn apply_source<T, S>(
        &self,
        source: &S,
        spec: PageSpec,
    ) -> Result<PageResult<T>, S::Error>
    where
        S: PagedSource<T>,
    {
        let (mut rows, total) = source.fetch_page(spec.offset(), spec.limit).await?;
        if rows.len() > spec.limit as usize {
            tracing::warn!(
                returned = rows.len(),
                limit = spec.limit,
                "Paged source returned more rows than requested, truncating"
            );
            rows.truncate(spec.limit as usize);
        }

        Ok(PageResult {
            data: rows,
            meta: PageMeta::new(spec, total),
        })
    }
}

/// Parse an integer, saturating out-of-range values instead of failing
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }

    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(if raw.starts_with('-') { i64::MIN } else { i64::MAX })
}
