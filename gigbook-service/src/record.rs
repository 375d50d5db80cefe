//! Named-field access for items flowing through the shaping helpers
//!
//! Sorting and searching operate on fields chosen by the client at request
//! time, so items expose their fields by name through [`Record`]. A field that
//! is missing or null is reported as `None`.
//!
//! # Example
//!
//! ```rust
//! use gigbook_service::record::{FieldValue, Record};
//!
//! struct Venue {
//!     name: String,
//!     capacity: Option<i64>,
//! }
//!
//! impl Record for Venue {
//!     fn field(&self, name: &str) -> Option<FieldValue> {
//!         match name {
//!             "name" => Some(FieldValue::from(self.name.as_str())),
//!             "capacity" => self.capacity.map(FieldValue::from),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let venue = Venue { name: "Studio A".into(), capacity: None };
//! assert_eq!(venue.field("name"), Some(FieldValue::Text("Studio A".into())));
//! assert_eq!(venue.field("capacity"), None);
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A single field value read from a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean flag
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// Point in time
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Rank used to order values of different kinds against each other
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Integer(_) | Self::Float(_) => 1,
            Self::Text(_) => 2,
            Self::Timestamp(_) => 3,
        }
    }

    /// Total order over field values
    ///
    /// Integers and floats compare numerically; values of different kinds
    /// order by kind (bool, number, text, timestamp).
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Items whose fields can be read by name
pub trait Record {
    /// Value of the named field, or `None` when missing or null
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl<T: Record + ?Sized> Record for &T {
    fn field(&self, name: &str) -> Option<FieldValue> {
        (**self).field(name)
    }
}

/// JSON objects expose their top-level keys; nested arrays and objects are
/// exposed as their JSON text.
impl Record for Value {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match self.get(name)? {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Integer(i)),
                None => n.as_f64().map(FieldValue::Float),
            },
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            nested => Some(FieldValue::Text(nested.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_field_kinds() {
        let item = json!({
            "name": "Hall B",
            "capacity": 300,
            "rating": 4.5,
            "indoor": true,
            "closed_on": null,
            "tags": ["jazz", "folk"]
        });

        assert_eq!(item.field("name"), Some(FieldValue::Text("Hall B".into())));
        assert_eq!(item.field("capacity"), Some(FieldValue::Integer(300)));
        assert_eq!(item.field("rating"), Some(FieldValue::Float(4.5)));
        assert_eq!(item.field("indoor"), Some(FieldValue::Bool(true)));
        assert_eq!(item.field("closed_on"), None);
        assert_eq!(item.field("missing"), None);
        assert_eq!(
            item.field("tags"),
            Some(FieldValue::Text(r#"["jazz","folk"]"#.into()))
        );
    }

    #[test]
    fn test_non_object_has_no_fields() {
        assert_eq!(json!("plain").field("name"), None);
        assert_eq!(json!(42).field("name"), None);
    }

    #[test]
    fn test_numeric_cross_comparison() {
        let int = FieldValue::Integer(5);
        let float = FieldValue::Float(4.5);
        assert_eq!(int.total_cmp(&float), Ordering::Greater);
        assert_eq!(float.total_cmp(&int), Ordering::Less);
        assert_eq!(
            FieldValue::Integer(2).total_cmp(&FieldValue::Float(2.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_mixed_kinds_order_by_rank() {
        let text = FieldValue::Text("a".into());
        let number = FieldValue::Integer(1_000);
        assert_eq!(number.total_cmp(&text), Ordering::Less);
        assert_eq!(FieldValue::Bool(true).total_cmp(&number), Ordering::Less);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Integer(7).to_string(), "7");
        assert_eq!(FieldValue::Text("Studio".into()).to_string(), "Studio");
        assert_eq!(FieldValue::Bool(false).to_string(), "false");
    }
}
