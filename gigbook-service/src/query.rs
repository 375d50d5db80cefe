//! Raw list-endpoint query parameters
//!
//! Every parameter is kept as the string the client sent. Extraction with
//! axum's `Query` therefore never rejects a request over a malformed `page`
//! or `direction`; the helpers clamp or default those values instead.
//!
//! # Example
//!
//! ```rust
//! use gigbook_service::query::ListQuery;
//!
//! let query = ListQuery::new()
//!     .with_page("2")
//!     .with_limit("50")
//!     .with_sort("price")
//!     .with_direction("desc")
//!     .with_search("studio");
//!
//! assert_eq!(query.page.as_deref(), Some("2"));
//! assert!(query.has_search());
//! ```

use serde::{Deserialize, Serialize};

/// Query parameters understood by shaped list endpoints
///
/// Recognised keys: `page`, `limit` (or `per_page`), `sort`, `direction`
/// (or `order`), `q` (or `query`, `search`), `fields`, `caseSensitive`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Requested page, 1-indexed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,

    /// Requested page size
    #[serde(alias = "per_page", skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,

    /// Field to sort by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// `asc` or `desc`
    #[serde(alias = "order", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,

    /// Search text
    #[serde(alias = "query", alias = "search", skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// Comma-separated fields to search in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,

    /// `true`, `1` or `yes` for case-sensitive search
    #[serde(rename = "caseSensitive", skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<String>,
}

impl ListQuery {
    /// Create an empty query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    #[must_use]
    pub fn with_search(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Restrict search to these fields
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = fields
            .into_iter()
            .map(|f| f.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.fields = Some(joined);
        self
    }

    #[must_use]
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive.to_string());
        self
    }

    /// Whether a non-blank search query was sent
    #[must_use]
    pub fn has_search(&self) -> bool {
        self.q.as_ref().is_some_and(|q| !q.trim().is_empty())
    }

    /// Whether a sort field was sent
    #[must_use]
    pub fn has_sort(&self) -> bool {
        self.sort.as_ref().is_some_and(|s| !s.trim().is_empty())
    }
}
