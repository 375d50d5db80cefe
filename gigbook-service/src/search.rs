//! Free-text search over allow-listed fields
//!
//! [`Searcher::resolve`] returns `None` when no search should happen: the
//! query is missing, too short or too long, or none of the requested fields
//! is searchable. [`Searcher::apply`] treats `None` as "no search requested"
//! and returns the items untouched, which keeps it distinct from a search
//! that matched nothing.
//!
//! Matching is plain substring containment on each field's string form.

use std::collections::HashSet;

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::record::Record;

/// Response header echoing the applied query
pub const X_SEARCH_QUERY: &str = "x-search-query";
/// Response header listing the searched fields
pub const X_SEARCH_FIELDS: &str = "x-search-fields";
/// Response header reporting case sensitivity
pub const X_SEARCH_CASE_SENSITIVE: &str = "x-search-case-sensitive";

/// A validated search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpec {
    /// Text to look for
    pub query: String,
    /// Fields to look in, in request order, without duplicates
    pub fields: Vec<String>,
    /// Match exact case
    pub case_sensitive: bool,
}

impl SearchSpec {
    /// Whether the item matches in at least one selected field
    pub fn matches<T: Record>(&self, item: &T) -> bool {
        let needle = if self.case_sensitive {
            self.query.clone()
        } else {
            self.query.to_lowercase()
        };

        self.fields.iter().any(|field| {
            item.field(field).is_some_and(|value| {
                let haystack = value.to_string();
                if self.case_sensitive {
                    haystack.contains(&needle)
                } else {
                    haystack.to_lowercase().contains(&needle)
                }
            })
        })
    }

    /// Write the `X-Search-*` headers describing this search
    ///
    /// A query that cannot be represented as a header value is left out.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.query) {
            Ok(value) => {
                headers.insert(X_SEARCH_QUERY, value);
            }
            Err(_) => tracing::debug!("Search query not representable as a header value"),
        }
        if let Ok(value) = HeaderValue::from_str(&self.fields.join(",")) {
            headers.insert(X_SEARCH_FIELDS, value);
        }
        headers.insert(
            X_SEARCH_CASE_SENSITIVE,
            HeaderValue::from_static(if self.case_sensitive { "true" } else { "false" }),
        );
    }
}

/// Resolves and applies search specs for one resource
#[derive(Debug, Clone)]
pub struct Searcher {
    allowed_fields: Vec<String>,
    min_length: usize,
    max_length: usize,
}

impl Searcher {
    /// Create a searcher with explicit query bounds (inclusive, in characters)
    pub fn new<I, S>(allowed_fields: I, min_length: usize, max_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_fields: allowed_fields.into_iter().map(Into::into).collect(),
            min_length,
            max_length,
        }
    }

    /// Build from the shared bounds and a resource's searchable fields
    pub fn from_config(config: &SearchConfig, search_fields: &[String]) -> Self {
        Self::new(
            search_fields.iter().cloned(),
            config.min_length,
            config.max_length,
        )
    }

    /// Fields clients may search in
    pub fn allowed_fields(&self) -> &[String] {
        &self.allowed_fields
    }

    /// Resolve raw query values into a search spec
    ///
    /// `raw_fields` is a comma-separated list; when absent every allowed field
    /// is searched. `raw_case_sensitive` accepts `true`, `1` or `yes`.
    pub fn resolve(
        &self,
        raw_query: Option<&str>,
        raw_fields: Option<&str>,
        raw_case_sensitive: Option<&str>,
    ) -> Option<SearchSpec> {
        let query = raw_query?.trim();
        let length = query.chars().count();
        if length < self.min_length || length > self.max_length {
            if length > 0 {
                tracing::debug!(
                    length,
                    min = self.min_length,
                    max = self.max_length,
                    "Search query outside length bounds, ignoring"
                );
            }
            return None;
        }

        let fields: Vec<String> = match raw_fields {
            Some(raw) => {
                let mut seen = HashSet::new();
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| self.allowed_fields.iter().any(|a| a == f))
                    .filter(|f| seen.insert(*f))
                    .map(str::to_string)
                    .collect()
            }
            None => self.allowed_fields.clone(),
        };

        if fields.is_empty() {
            tracing::debug!(requested = ?raw_fields, "No searchable fields requested, ignoring");
            return None;
        }

        Some(SearchSpec {
            query: query.to_string(),
            fields,
            case_sensitive: raw_case_sensitive.is_some_and(parse_flag),
        })
    }

    /// Keep items matching `spec`; `None` returns the items unchanged
    pub fn apply<T: Record>(&self, items: Vec<T>, spec: Option<&SearchSpec>) -> Vec<T> {
        match spec {
            Some(spec) => items.into_iter().filter(|item| spec.matches(item)).collect(),
            None => items,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
