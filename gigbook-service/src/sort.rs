//! Sorting for list endpoints
//!
//! A [`Sorter`] holds the allow-list of sortable fields for one resource.
//! [`Sorter::resolve`] turns raw `sort`/`direction` query values into a
//! [`SortSpec`] and never fails: an unknown field falls back to the default
//! field and an unknown direction to the default direction.
//!
//! Items with a null or missing sort field always go to the end of the
//! result, whichever direction is requested.
//!
//! # Example
//!
//! ```rust
//! use gigbook_service::sort::{SortDirection, Sorter};
//! use serde_json::json;
//!
//! let sorter = Sorter::new(["name", "price"], "name", SortDirection::Asc);
//! let spec = sorter.resolve(Some("price"), Some("desc"));
//!
//! let sorted = sorter.apply(
//!     vec![json!({"price": 5}), json!({"price": null}), json!({"price": 1})],
//!     &spec,
//! );
//! assert_eq!(sorted[0]["price"], 5);
//! assert_eq!(sorted[1]["price"], 1);
//! assert!(sorted[2]["price"].is_null());
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ResourceConfig;
use crate::record::{FieldValue, Record};

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending (A-Z, 0-9, oldest first)
    #[default]
    Asc,
    /// Descending (Z-A, 9-0, newest first)
    Desc,
}

impl SortDirection {
    /// Parse a raw direction, accepting `asc`/`desc` in any case
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    /// SQL keyword for this direction
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// A validated sort request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to order by; always on the allow-list
    pub field: String,
    /// Ordering direction
    pub direction: SortDirection,
}

impl SortSpec {
    /// `ORDER BY` fragment for a deferred SQL query
    ///
    /// Safe to interpolate because `field` only ever comes from the allow-list.
    /// Nulls are placed last to match in-memory sorting.
    pub fn order_by_clause(&self) -> String {
        format!("{} {} NULLS LAST", self.field, self.direction.as_sql())
    }
}

/// Resolves and applies sort specs for one resource
#[derive(Debug, Clone)]
pub struct Sorter {
    allowed_fields: Vec<String>,
    default_field: String,
    default_direction: SortDirection,
}

impl Sorter {
    /// Create a sorter; the default field is always sortable
    pub fn new<I, S>(
        allowed_fields: I,
        default_field: impl Into<String>,
        default_direction: SortDirection,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_field = default_field.into();
        let mut allowed_fields: Vec<String> =
            allowed_fields.into_iter().map(Into::into).collect();
        if !allowed_fields.contains(&default_field) {
            allowed_fields.push(default_field.clone());
        }

        Self {
            allowed_fields,
            default_field,
            default_direction,
        }
    }

    /// Build from a resource's configuration
    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(
            config.sort_fields.iter().cloned(),
            config.default_sort.clone(),
            config.default_direction,
        )
    }

    /// Fields clients may sort by
    pub fn allowed_fields(&self) -> &[String] {
        &self.allowed_fields
    }

    /// Resolve raw query values into a sort spec
    pub fn resolve(&self, raw_field: Option<&str>, raw_direction: Option<&str>) -> SortSpec {
        let field = match raw_field.map(str::trim).filter(|f| !f.is_empty()) {
            Some(requested) if self.allowed_fields.iter().any(|f| f == requested) => {
                requested.to_string()
            }
            Some(requested) => {
                tracing::debug!(
                    requested,
                    fallback = %self.default_field,
                    "Sort field not allowed, using default"
                );
                self.default_field.clone()
            }
            None => self.default_field.clone(),
        };

        let direction = raw_direction
            .and_then(SortDirection::parse)
            .unwrap_or(self.default_direction);

        SortSpec { field, direction }
    }

    /// Order items by `spec`
    ///
    /// The sort is stable: items with equal keys keep their input order.
    /// Null or missing values sort to the end in both directions.
    pub fn apply<T: Record>(&self, items: Vec<T>, spec: &SortSpec) -> Vec<T> {
        // Read each key once rather than on every comparison
        let mut keyed: Vec<(Option<FieldValue>, T)> = items
            .into_iter()
            .map(|item| (item.field(&spec.field), item))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| compare_nulls_last(a.as_ref(), b.as_ref(), spec.direction));

        keyed.into_iter().map(|(_, item)| item).collect()
    }
}

fn compare_nulls_last(
    a: Option<&FieldValue>,
    b: Option<&FieldValue>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => a.total_cmp(b),
            SortDirection::Desc => b.total_cmp(a),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sorter() -> Sorter {
        Sorter::new(["name", "price", "capacity"], "name", SortDirection::Asc)
    }

    fn prices(items: &[Value]) -> Vec<Value> {
        items.iter().map(|i| i["price"].clone()).collect()
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse(" Desc "), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    #[test]
    fn test_direction_display_and_sql() {
        assert_eq!(SortDirection::Desc.to_string(), "desc");
        assert_eq!(SortDirection::Asc.as_sql(), "ASC");
    }

    #[test]
    fn test_resolve_allowed_field() {
        let spec = sorter().resolve(Some("price"), Some("desc"));
        assert_eq!(spec.field, "price");
        assert_eq!(spec.direction, SortDirection::Desc);
    }

    #[test]
    fn test_resolve_unknown_field_uses_default() {
        for raw in ["password_hash", "", "  ", "PRICE"] {
            let spec = sorter().resolve(Some(raw), None);
            assert_eq!(spec.field, "name", "raw field {:?}", raw);
        }
        assert_eq!(sorter().resolve(None, None).field, "name");
    }

    #[test]
    fn test_resolve_garbage_direction_uses_default() {
        let spec = sorter().resolve(Some("price"), Some("up"));
        assert_eq!(spec.direction, SortDirection::Asc);

        let desc_default = Sorter::new(["created_at"], "created_at", SortDirection::Desc);
        assert_eq!(
            desc_default.resolve(None, Some("bogus")).direction,
            SortDirection::Desc
        );
    }

    #[test]
    fn test_default_field_is_always_allowed() {
        let sorter = Sorter::new(["price"], "created_at", SortDirection::Asc);
        assert!(sorter.allowed_fields().contains(&"created_at".to_string()));
        assert_eq!(sorter.resolve(Some("created_at"), None).field, "created_at");
    }

    #[test]
    fn test_desc_puts_null_last() {
        let sorter = sorter();
        let spec = sorter.resolve(Some("price"), Some("desc"));
        let sorted = sorter.apply(
            vec![json!({"price": 5}), json!({"price": null}), json!({"price": 1})],
            &spec,
        );
        assert_eq!(prices(&sorted), vec![json!(5), json!(1), Value::Null]);
    }

    #[test]
    fn test_asc_puts_null_and_missing_last() {
        let sorter = sorter();
        let spec = sorter.resolve(Some("price"), Some("asc"));
        let sorted = sorter.apply(
            vec![
                json!({"id": 1, "price": null}),
                json!({"id": 2, "price": 9}),
                json!({"id": 3}),
                json!({"id": 4, "price": 2.5}),
            ],
            &spec,
        );
        let ids: Vec<i64> = sorted.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_equal_keys_keep_input_order() {
        let sorter = sorter();
        let spec = sorter.resolve(Some("capacity"), Some("desc"));
        let sorted = sorter.apply(
            vec![
                json!({"id": "a", "capacity": 100}),
                json!({"id": "b", "capacity": 200}),
                json!({"id": "c", "capacity": 100}),
            ],
            &spec,
        );
        let ids: Vec<&str> = sorted.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_text_sort() {
        let sorter = sorter();
        let spec = sorter.resolve(None, None);
        let sorted = sorter.apply(
            vec![json!({"name": "Studio A"}), json!({"name": "Hall B"})],
            &spec,
        );
        assert_eq!(sorted[0]["name"], "Hall B");
    }

    #[test]
    fn test_order_by_clause() {
        let spec = sorter().resolve(Some("price"), Some("desc"));
        assert_eq!(spec.order_by_clause(), "price DESC NULLS LAST");
    }

    #[test]
    fn test_from_config() {
        let config = ResourceConfig {
            sort_fields: vec!["starts_at".into()],
            default_sort: "starts_at".into(),
            default_direction: SortDirection::Desc,
            search_fields: vec![],
        };
        let spec = Sorter::from_config(&config).resolve(Some("nope"), None);
        assert_eq!(spec.field, "starts_at");
        assert_eq!(spec.direction, SortDirection::Desc);
    }
}
