use lobby_models::gateway::OutboundEvent;
use tokio::sync::broadcast;

/// A realtime event plus its delivery scope. Sessions subscribe to the bus
/// and filter: targeted events reach only the listed users (their personal
/// channel); room events reach only sessions joined to that room;
/// `except_user_id` suppresses delivery back to the originator.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event: OutboundEvent,
    /// Scope to one conversation room. None with no targets = global.
    pub room_id: Option<i64>,
    /// When set, deliver only to these users regardless of room membership.
    pub target_user_ids: Option<Vec<i64>>,
    /// Never deliver back to this user (no self-echo).
    pub except_user_id: Option<i64>,
    /// Sessions drop this room from their joined set on receipt, whether or
    /// not the payload is delivered to them.
    pub evict_room_id: Option<i64>,
}

/// Broadcast-based event bus for realtime dispatch.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Fan out to every session joined to the room, except the originator.
    pub fn dispatch_room(&self, event: OutboundEvent, room_id: i64, except_user_id: Option<i64>) {
        self.publish(ServerEvent {
            event,
            room_id: Some(room_id),
            target_user_ids: None,
            except_user_id,
            evict_room_id: None,
        });
    }

    /// Deliver to specific users' personal channels.
    pub fn dispatch_to_users(&self, event: OutboundEvent, target_user_ids: Vec<i64>) {
        self.publish(ServerEvent {
            event,
            room_id: None,
            target_user_ids: Some(target_user_ids),
            except_user_id: None,
            evict_room_id: None,
        });
    }

    /// Deliver to every connected session (presence changes).
    pub fn dispatch_global(&self, event: OutboundEvent, except_user_id: Option<i64>) {
        self.publish(ServerEvent {
            event,
            room_id: None,
            target_user_ids: None,
            except_user_id,
            evict_room_id: None,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.dispatch_global(
            OutboundEvent::UserStatusUpdate {
                user_id: "1".into(),
                is_online: true,
            },
            None,
        );
        let event = rx.recv().await.expect("event");
        assert!(event.room_id.is_none());
        assert!(event.target_user_ids.is_none());
    }

    #[tokio::test]
    async fn room_dispatch_carries_scope() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.dispatch_room(
            OutboundEvent::Typing {
                conversation_id: "99".into(),
                sender: "1".into(),
                sender_name: "ada".into(),
            },
            99,
            Some(1),
        );
        let event = rx.recv().await.expect("event");
        assert_eq!(event.room_id, Some(99));
        assert_eq!(event.except_user_id, Some(1));
    }
}
