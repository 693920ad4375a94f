//! Outbound transport seam and session lifecycle events.

use datafront_protocol::ClientId;
use serde_json::Value;
use tokio::sync::broadcast;

/// Outbound transport abstraction.
///
/// Implement this trait to hand messages to the actual connection layer
/// (websocket hub, socket server, test recorder). The sync core calls it
/// from the flush worker only; implementations must not call back into the
/// core.
pub trait Comms: Send + Sync {
    /// Delivers `payload` as `event` to the given clients within a scope.
    fn broadcast(
        &self,
        scope: &str,
        event: &str,
        recipients: &[ClientId],
        payload: Value,
    ) -> Result<(), String>;
}

/// Session lifecycle events shared across the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A client's connection ended.
    ClientOffline {
        /// The disconnected session.
        client: ClientId,
    },
}

/// Broadcast bus for [`SessionEvent`]s.
///
/// The connection layer emits events here; the registry subscribes and
/// cleans up the disconnected client's subscriptions. Cloning the bus
/// shares the underlying channel.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Creates a bus buffering up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to every subscriber.
    ///
    /// An event with no subscribers is dropped silently.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = SessionEvents::default();
        let mut receiver = bus.subscribe();

        let event = SessionEvent::ClientOffline {
            client: ClientId::new("c-1"),
        };
        bus.emit(event.clone());

        assert_eq!(receiver.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = SessionEvents::default();
        bus.emit(SessionEvent::ClientOffline {
            client: ClientId::new("c-1"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = SessionEvents::default();
        let mut receiver = bus.subscribe();

        let clone = bus.clone();
        clone.emit(SessionEvent::ClientOffline {
            client: ClientId::new("c-2"),
        });

        assert!(receiver.recv().await.is_ok());
    }
}
