//! Broadcast publisher, the default [`EventSink`].
//!
//! ```rust
//! use calcflow_core::events::{CalcEvent, EventPublisher, EventSink, TaskProgress};
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::new(16);
//! let mut owner = publisher.subscribe_user(7, false);
//!
//! publisher.publish(CalcEvent::TaskProgress(TaskProgress {
//!     user_id: 7,
//!     task_id: 1,
//!     last_ping: "2024-01-01 12:00:00".into(),
//!     is_done: true,
//!     result: Some("10".into()),
//! }));
//!
//! let published = owner.recv().await.unwrap();
//! assert_eq!(published.name, "update task");
//! # });
//! ```

use tokio::sync::broadcast;

use super::types::{CalcEvent, EventAudience, EventSink};

/// Broadcast-backed event sink.
///
/// Slow subscribers lag and lose the oldest events instead of slowing publishers down.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: &'static str,
    pub audience: EventAudience,
    pub event: CalcEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Whether a connected observer may see this event
    pub fn is_visible_to(&self, user_id: i64, is_admin: bool) -> bool {
        match self.audience {
            EventAudience::User(owner) => owner == user_id,
            EventAudience::Admins => is_admin,
        }
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events one observer is allowed to see
    pub fn subscribe_user(&self, user_id: i64, is_admin: bool) -> UserSubscription {
        UserSubscription {
            receiver: self.sender.subscribe(),
            user_id,
            is_admin,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver filtered down to one observer's audience
#[derive(Debug)]
pub struct UserSubscription {
    receiver: broadcast::Receiver<PublishedEvent>,
    user_id: i64,
    is_admin: bool,
}

impl UserSubscription {
    /// Next visible event, or `None` once the publisher is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<PublishedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_visible_to(self.user_id, self.is_admin) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(user_id = self.user_id, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl EventSink for EventPublisher {
    fn publish(&self, event: CalcEvent) {
        let published = PublishedEvent {
            name: event.name(),
            audience: event.audience(),
            event,
            published_at: chrono::Utc::now(),
        };
        // no subscribers is fine, the event is simply dropped
        let _ = self.sender.send(published);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
