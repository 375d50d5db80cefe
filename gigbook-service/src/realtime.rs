//! Topic-based live updates
//!
//! Subscribers call [`RealtimeHub::subscribe`] and read events from the
//! returned [`Subscription`], which is a [`Stream`]. A subscription ends when
//! it is dropped, when [`Subscription::unsubscribe`] is called, or when the
//! token from [`Subscription::cancel_token`] is cancelled. Topics are created
//! on first subscribe and removed when their last subscriber goes away.
//!
//! ```rust,ignore
//! let hub = RealtimeHub::new();
//! let mut inbox = hub.subscribe("conversation:42");
//!
//! hub.publish("conversation:42", Event::json("message.created", &message)?);
//!
//! while let Some(event) = inbox.next().await {
//!     render(event);
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::activity::Activity;

/// Events buffered per topic before slow subscribers start losing them
pub const DEFAULT_CAPACITY: usize = 256;

/// A message delivered to topic subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Time-ordered unique id
    pub id: Uuid,
    /// Topic the event was published on; set by [`RealtimeHub::publish`]
    pub topic: String,
    /// Event name, e.g. `message.created`
    pub name: String,
    /// Event body as JSON
    pub payload: Value,
    /// When the event was created
    pub published_at: DateTime<Utc>,
}

impl Event {
    /// Event with a fresh id and the current time; the topic is filled in on publish
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            topic: String::new(),
            name: name.into(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// Event with a serialized payload
    pub fn json<T: Serialize>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, serde_json::to_value(payload)?))
    }

    /// Event announcing a new feed activity, named `activity.<kind>`
    pub fn activity(activity: &Activity) -> Result<Self, serde_json::Error> {
        Self::json(format!("activity.{}", activity.kind()), activity)
    }
}

/// Identifier of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Topics = DashMap<String, broadcast::Sender<Event>>;

/// Fan-out of events to per-topic subscribers
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    topics: Arc<Topics>,
    capacity: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    /// Hub buffering [`DEFAULT_CAPACITY`] events per topic
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Hub buffering `capacity` events per topic (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Start receiving events published on `topic`
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        let topic = topic.into();
        let receiver = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let id = SubscriptionId::new();
        let cancel = CancellationToken::new();
        tracing::debug!(subscription_id = %id, topic = %topic, "Realtime subscription opened");

        Subscription {
            id,
            topic,
            events: BroadcastStream::new(receiver),
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
            cancel,
            topics: Arc::clone(&self.topics),
            done: false,
        }
    }

    /// Publish an event, returning how many subscribers will receive it
    pub fn publish(&self, topic: &str, mut event: Event) -> usize {
        event.topic = topic.to_string();
        let delivered = self
            .topics
            .get(topic)
            .and_then(|sender| sender.send(event).ok())
            .unwrap_or(0);

        tracing::trace!(topic, delivered, "Published realtime event");
        delivered
    }

    /// Number of topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// A live stream of events for one topic
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    events: BroadcastStream<Event>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    topics: Arc<Topics>,
    done: bool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("done", &self.done)
            .finish()
    }
}

impl Subscription {
    /// Identifier of this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Topic this subscription listens on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Token that ends this subscription when cancelled
    ///
    /// Useful when the stream has been handed to another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop receiving events and release the subscription
    pub fn unsubscribe(self) {
        tracing::debug!(subscription_id = %self.id, topic = %self.topic, "Unsubscribed");
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.done = true;
            return Poll::Ready(None);
        }

        loop {
            match this.events.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(
                        subscription_id = %this.id,
                        topic = %this.topic,
                        skipped,
                        "Realtime subscriber lagged, events dropped"
                    );
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our own receiver is still alive here, hence `<= 1`
        let removed = self
            .topics
            .remove_if(&self.topic, |_, sender| sender.receiver_count() <= 1)
            .is_some();
        if removed {
            tracing::debug!(topic = %self.topic, "Realtime topic closed");
        }
    }
}
