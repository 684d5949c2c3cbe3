//! Publish progress events
//!
//! Services emit events on a `tokio::sync::broadcast` channel. Emitting
//! never blocks: with no subscribers the event is dropped, and a lagging
//! subscriber loses the oldest events rather than slowing the publisher.
//!
//! ```
//! use libcrosspost::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PublishFailed {
//!     post_id: "abc123".to_string(),
//!     error: "every request failed".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Platform;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before the oldest drop
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Requests were composed and are about to be sent
    PublishStarted {
        post_id: String,
        platforms: Vec<Platform>,
        requests: usize,
    },

    /// One request changed state ("sending", "sent", "failed")
    PublishProgress {
        post_id: String,
        platforms: Vec<Platform>,
        status: String,
    },

    /// At least one platform succeeded
    PublishCompleted {
        post_id: String,
        results: Vec<PlatformResult>,
    },

    /// Nothing was published
    PublishFailed { post_id: String, error: String },
}

/// Outcome for a single platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub success: bool,
    /// External post id on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.emit(Event::PublishStarted {
            post_id: "p1".to_string(),
            platforms: vec![Platform::X, Platform::Reddit],
            requests: 2,
        });

        match receiver.recv().await.unwrap() {
            Event::PublishStarted {
                post_id,
                platforms,
                requests,
            } => {
                assert_eq!(post_id, "p1");
                assert_eq!(platforms, vec![Platform::X, Platform::Reddit]);
                assert_eq!(requests, 2);
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = Event::PublishProgress {
            post_id: "p2".to_string(),
            platforms: vec![Platform::Bluesky, Platform::Linkedin],
            status: "sending".to_string(),
        };
        bus.emit(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(Event::PublishFailed {
            post_id: "p3".to_string(),
            error: "nope".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::PublishCompleted {
            post_id: "p4".to_string(),
            results: vec![PlatformResult {
                platform: Platform::GoogleBusiness,
                success: true,
                post_id: Some("gmb-1".to_string()),
                url: None,
                error: None,
            }],
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "publish_completed");
        assert_eq!(json["results"][0]["platform"], "google_business");
        assert!(json["results"][0].get("error").is_none());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
