//! Activity feed entries
//!
//! A dashboard feed mixes bookings, messages and payments. Each kind carries
//! its own typed fields and the JSON form is tagged with `"type"`:
//!
//! ```json
//! { "type": "payment", "id": "…", "booking_id": "…", "amount_cents": 45000,
//!   "currency": "EUR", "status": "succeeded", "occurred_at": "2026-03-01T20:00:00Z" }
//! ```
//!
//! Activities implement [`Record`], so a merged feed can go through a
//! [`ResponseShaper`](crate::shaping::ResponseShaper) like any other list.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{FieldValue, Record};

/// Lifecycle of a booking request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    Confirmed,
    Declined,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Outcome of a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        })
    }
}

/// A booking changed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingActivity {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub venue_name: String,
    pub status: BookingStatus,
    pub occurred_at: DateTime<Utc>,
}

/// A message arrived in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageActivity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: String,
    /// First characters of the message body
    pub preview: String,
    pub occurred_at: DateTime<Utc>,
}

/// A payment moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentActivity {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Amount in minor units
    pub amount_cents: u64,
    /// ISO 4217 code
    pub currency: String,
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// One entry in an activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    Booking(BookingActivity),
    Message(MessageActivity),
    Payment(PaymentActivity),
}

impl Activity {
    /// Value of the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Booking(_) => "booking",
            Self::Message(_) => "message",
            Self::Payment(_) => "payment",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Booking(a) => a.id,
            Self::Message(a) => a.id,
            Self::Payment(a) => a.id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Booking(a) => a.occurred_at,
            Self::Message(a) => a.occurred_at,
            Self::Payment(a) => a.occurred_at,
        }
    }

    /// One-line description for feed rendering
    pub fn summary(&self) -> String {
        match self {
            Self::Booking(a) => format!("Booking at {} {}", a.venue_name, a.status),
            Self::Message(a) => format!("{}: {}", a.sender, a.preview),
            Self::Payment(a) => format!(
                "Payment of {}.{:02} {} {}",
                a.amount_cents / 100,
                a.amount_cents % 100,
                a.currency,
                a.status
            ),
        }
    }
}

impl Record for Activity {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "type" => return Some(FieldValue::from(self.kind())),
            "id" => return Some(FieldValue::from(self.id().to_string())),
            "occurred_at" => return Some(FieldValue::from(self.occurred_at())),
            "summary" => return Some(FieldValue::from(self.summary())),
            _ => {}
        }

        match (self, name) {
            (Self::Booking(a), "venue_name") => Some(FieldValue::from(a.venue_name.as_str())),
            (Self::Booking(a), "status") => Some(FieldValue::from(a.status.to_string())),
            (Self::Message(a), "sender") => Some(FieldValue::from(a.sender.as_str())),
            (Self::Message(a), "preview") => Some(FieldValue::from(a.preview.as_str())),
            (Self::Payment(a), "amount_cents") => {
                i64::try_from(a.amount_cents).ok().map(FieldValue::from)
            }
            (Self::Payment(a), "currency") => Some(FieldValue::from(a.currency.as_str())),
            (Self::Payment(a), "status") => Some(FieldValue::from(a.status.to_string())),
            _ => None,
        }
    }
}

/// Activities from several sources, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityFeed {
    items: Vec<Activity>,
}

impl ActivityFeed {
    /// Merge per-source lists into one feed ordered by `occurred_at`, newest
    /// first. Entries with the same timestamp keep their source order.
    pub fn merge<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Vec<Activity>>,
    {
        let mut items: Vec<Activity> = sources.into_iter().flatten().collect();
        items.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
        Self { items }
    }

    /// The `n` most recent entries
    pub fn latest(&self, n: usize) -> &[Activity] {
        &self.items[..n.min(self.items.len())]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_inner(self) -> Vec<Activity> {
        self.items
    }
}

impl IntoIterator for ActivityFeed {
    type Item = Activity;
    type IntoIter = std::vec::IntoIter<Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn booking(hour: u32) -> Activity {
        Activity::Booking(BookingActivity {
            id: Uuid::new_v4(),
            gig_id: Uuid::new_v4(),
            venue_name: "Studio A".into(),
            status: BookingStatus::Confirmed,
            occurred_at: at(hour),
        })
    }

    fn message(hour: u32) -> Activity {
        Activity::Message(MessageActivity {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender: "Mara".into(),
            preview: "Soundcheck at 6?".into(),
            occurred_at: at(hour),
        })
    }

    fn payment(hour: u32) -> Activity {
        Activity::Payment(PaymentActivity {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            amount_cents: 45_005,
            currency: "EUR".into(),
            status: PaymentStatus::Succeeded,
            occurred_at: at(hour),
        })
    }

    #[test]
    fn test_tagged_json() {
        let activity = payment(20);
        let value = serde_json::to_value(&activity).unwrap();
        assert_eq!(value["type"], "payment");
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["amount_cents"], 45_005);

        let back: Activity = serde_json::from_value(value).unwrap();
        assert_eq!(back, activity);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let raw = json!({"type": "refund_request", "id": Uuid::new_v4()});
        assert!(serde_json::from_value::<Activity>(raw).is_err());
    }

    #[test]
    fn test_summary() {
        assert_eq!(booking(9).summary(), "Booking at Studio A confirmed");
        assert_eq!(message(9).summary(), "Mara: Soundcheck at 6?");
        assert_eq!(payment(9).summary(), "Payment of 450.05 EUR succeeded");
    }

    #[test]
    fn test_merge_orders_newest_first() {
        let feed = ActivityFeed::merge([
            vec![booking(9), booking(14)],
            vec![message(11)],
            vec![payment(20)],
        ]);

        let kinds: Vec<&str> = feed.latest(10).iter().map(Activity::kind).collect();
        assert_eq!(kinds, vec!["payment", "booking", "message", "booking"]);
        assert_eq!(feed.latest(2).len(), 2);
        assert_eq!(feed.len(), 4);
    }

    #[test]
    fn test_merge_keeps_source_order_on_ties() {
        let first = message(12);
        let second = payment(12);
        let feed = ActivityFeed::merge([vec![first.clone()], vec![second.clone()]]);
        assert_eq!(feed.into_inner(), vec![first, second]);
    }

    #[test]
    fn test_record_fields() {
        let activity = payment(20);
        assert_eq!(activity.field("type"), Some(FieldValue::from("payment")));
        assert_eq!(activity.field("currency"), Some(FieldValue::from("EUR")));
        assert_eq!(activity.field("amount_cents"), Some(FieldValue::Integer(45_005)));
        assert_eq!(activity.field("occurred_at"), Some(FieldValue::Timestamp(at(20))));
        assert_eq!(activity.field("venue_name"), None);
        assert_eq!(booking(1).field("status"), Some(FieldValue::from("confirmed")));
    }
}
