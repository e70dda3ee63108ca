//! Publication channel.
//!
//! A [`Hub`] is a registry of subscriber sinks. The engine publishes typed
//! [`Event`]s through it; subscribers' own messages are relayed verbatim to every
//! subscriber. The hub knows nothing about the transport: a sink is just the
//! sending half of an unbounded channel of serialized frames.

pub mod ws;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Event type carrying the full host table.
pub const HOSTS_EVENT: &str = "hosts";

/// Two-field message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(kind: &str, payload: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub type SubscriberId = u64;

/// Receiving half handed to the transport for one subscriber.
pub type SubscriberStream = mpsc::UnboundedReceiver<String>;

type Sink = mpsc::UnboundedSender<String>;

/// Fan-out registry of subscriber sinks.
#[derive(Debug, Default)]
pub struct Hub {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<SubscriberId, Sink>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. `greeting`, if any, is queued as its first frame.
    ///
    /// The greeting is produced while the registry is locked, so no publish can
    /// slip in between computing it and registering the sink.
    pub fn subscribe<F>(&self, greeting: F) -> (SubscriberId, SubscriberStream)
    where
        F: FnOnce() -> Option<String>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut sinks = self.lock();
        if let Some(frame) = greeting() {
            // The receiver is alive in this scope, so this cannot fail.
            let _ = tx.send(frame);
        }
        sinks.insert(id, tx);
        tracing::debug!("Subscriber {} connected ({} total)", id, sinks.len());

        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut sinks = self.lock();
        if sinks.remove(&id).is_some() {
            tracing::debug!("Subscriber {} disconnected ({} total)", id, sinks.len());
        }
    }

    /// Serialize `event` once and push the same frame to every subscriber.
    ///
    /// Returns the number of subscribers the frame was delivered to.
    pub fn publish(&self, event: &Event) -> usize {
        match event.to_frame() {
            Ok(frame) => self.broadcast(frame),
            Err(e) => {
                tracing::error!("Failed to serialize '{}' event: {}", event.kind, e);
                0
            }
        }
    }

    /// Push a subscriber's raw message to every subscriber, sender included.
    pub fn relay(&self, raw: &str) -> usize {
        tracing::debug!("Relaying message: {}", raw);
        self.broadcast(raw.to_string())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn broadcast(&self, frame: String) -> usize {
        let mut sinks = self.lock();
        // Sinks whose receiver is gone are dropped here rather than waiting for
        // the transport to unsubscribe them.
        sinks.retain(|id, tx| {
            let alive = tx.send(frame.clone()).is_ok();
            if !alive {
                tracing::debug!("Dropping closed subscriber {}", id);
            }
            alive
        });
        sinks.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Sink>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope() {
        let event = Event::new(HOSTS_EVENT, vec!["a", "b"]).unwrap();
        let frame = event.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, serde_json::json!({"type": "hosts", "payload": ["a", "b"]}));
    }

    #[test]
    fn test_publish_same_frame_to_all() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.subscribe(|| None);
        let (_b, mut rx_b) = hub.subscribe(|| None);

        let event = Event::new(HOSTS_EVENT, serde_json::json!([{"ip": "10.0.0.1"}])).unwrap();
        assert_eq!(hub.publish(&event), 2);

        let frame_a = rx_a.try_recv().unwrap();
        let frame_b = rx_b.try_recv().unwrap();
        assert_eq!(frame_a, frame_b);
        assert_eq!(frame_a, event.to_frame().unwrap());
    }

    #[test]
    fn test_greeting_is_first_frame() {
        let hub = Hub::new();
        let (_id, mut rx) = hub.subscribe(|| Some("hello".to_string()));
        hub.relay("second");

        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert_eq!(rx.try_recv().unwrap(), "second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_relay_includes_sender_verbatim() {
        let hub = Hub::new();
        let (_sender, mut rx_sender) = hub.subscribe(|| None);
        let (_other, mut rx_other) = hub.subscribe(|| None);

        let raw = r#"{"type":"chat","payload":"not re-encoded" }"#;
        assert_eq!(hub.relay(raw), 2);
        assert_eq!(rx_sender.try_recv().unwrap(), raw);
        assert_eq!(rx_other.try_recv().unwrap(), raw);
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let hub = Hub::new();
        let (_kept, mut rx_kept) = hub.subscribe(|| None);
        let (_gone, rx_gone) = hub.subscribe(|| None);
        drop(rx_gone);

        assert_eq!(hub.relay("ping"), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(rx_kept.try_recv().unwrap(), "ping");
    }

    #[test]
    fn test_unsubscribe() {
        let hub = Hub::new();
        let (id, _rx) = hub.subscribe(|| None);
        hub.unsubscribe(id);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.relay("nobody"), 0);
    }
}
