//! Event dispatch to application code.

use bytes::Bytes;
use tokio::sync::broadcast;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer connected and was assigned a net id.
    Connect { net_id: u32 },
    /// A peer sent a datagram.
    Data { net_id: u32, data: Bytes },
    /// A peer disconnected.
    Disconnect { net_id: u32 },
}

impl ServerEvent {
    pub fn net_id(&self) -> u32 {
        match self {
            ServerEvent::Connect { net_id }
            | ServerEvent::Data { net_id, .. }
            | ServerEvent::Disconnect { net_id } => *net_id,
        }
    }

    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connect { .. } => "connect",
            ServerEvent::Data { .. } => "data",
            ServerEvent::Disconnect { .. } => "disconnect",
        }
    }
}

/// Fans server events out to all subscribers.
pub struct EventBroadcaster {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Emits an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: ServerEvent) -> usize {
        // No subscribers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receives the next event, skipping over lag.
///
/// Returns `None` once the broadcaster is gone.
pub async fn next_event(receiver: &mut broadcast::Receiver<ServerEvent>) -> Option<ServerEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event subscriber lagged {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = ServerEvent::Data {
            net_id: 3,
            data: Bytes::from_static(b"x"),
        };
        assert_eq!(event.net_id(), 3);
        assert_eq!(event.name(), "data");
        assert_eq!(ServerEvent::Connect { net_id: 1 }.name(), "connect");
        assert_eq!(ServerEvent::Disconnect { net_id: 1 }.name(), "disconnect");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.emit(ServerEvent::Connect { net_id: 0 }), 0);
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let broadcaster = EventBroadcaster::new(4);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        assert_eq!(broadcaster.emit(ServerEvent::Connect { net_id: 9 }), 2);
        assert_eq!(
            next_event(&mut rx1).await,
            Some(ServerEvent::Connect { net_id: 9 })
        );
        assert_eq!(
            next_event(&mut rx2).await,
            Some(ServerEvent::Connect { net_id: 9 })
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();

        for net_id in 0..5 {
            broadcaster.emit(ServerEvent::Connect { net_id });
        }

        assert_eq!(
            next_event(&mut rx).await,
            Some(ServerEvent::Connect { net_id: 3 })
        );
    }

    #[tokio::test]
    async fn test_closed_broadcaster() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();
        drop(broadcaster);

        assert_eq!(next_event(&mut rx).await, None);
    }
}
