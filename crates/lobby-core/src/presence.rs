//! Process-wide live presence. The in-memory registry is authoritative for
//! the running process; the users table's is_online/last_seen columns are a
//! best-effort mirror for display to other users.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lobby_db::{users, DbPool};
use lobby_models::gateway::OutboundEvent;

use crate::events::EventBus;

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
}

/// One slot per user, last-connect-wins. No multi-device fan-out: a second
/// connection for the same user takes over the slot and the first session's
/// eventual disconnect is ignored as stale.
pub struct PresenceRegistry {
    entries: DashMap<i64, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Idempotent; overwrites any prior entry for the user.
    pub fn insert(&self, user_id: i64, session_id: &str) -> PresenceEntry {
        let entry = PresenceEntry {
            session_id: session_id.to_string(),
            connected_at: Utc::now(),
        };
        self.entries.insert(user_id, entry.clone());
        entry
    }

    /// Remove the user's entry if it still belongs to this session.
    /// Returns false for a stale session whose slot was taken over.
    pub fn remove(&self, user_id: i64, session_id: &str) -> bool {
        self.entries
            .remove_if(&user_id, |_, entry| entry.session_id == session_id)
            .is_some()
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.entries.len()
    }

    pub fn online_user_ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Mark a user online: registry first (authoritative), then the persisted
/// mirror, then a global presence broadcast. Persistence failures are logged
/// and swallowed; they never fail the session setup.
pub async fn mark_online(
    db: &DbPool,
    bus: &EventBus,
    registry: &PresenceRegistry,
    user_id: i64,
    session_id: &str,
) {
    registry.insert(user_id, session_id);

    if let Err(err) = users::set_presence(db, user_id, true, Utc::now()).await {
        tracing::warn!(user_id, "failed to persist online status: {err}");
    }

    bus.dispatch_global(
        OutboundEvent::UserStatusUpdate {
            user_id: user_id.to_string(),
            is_online: true,
        },
        Some(user_id),
    );
}

/// Mark a user offline on disconnect. A stale session id (slot taken over by
/// a newer connection) is a no-op so reconnects never flap the new session.
pub async fn mark_offline(
    db: &DbPool,
    bus: &EventBus,
    registry: &PresenceRegistry,
    user_id: i64,
    session_id: &str,
) {
    if !registry.remove(user_id, session_id) {
        return;
    }

    if let Err(err) = users::set_presence(db, user_id, false, Utc::now()).await {
        tracing::warn!(user_id, "failed to persist offline status: {err}");
    }

    bus.dispatch_global(
        OutboundEvent::UserStatusUpdate {
            user_id: user_id.to_string(),
            is_online: false,
        },
        Some(user_id),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let registry = PresenceRegistry::new();
        assert!(!registry.is_online(1));

        registry.insert(1, "sess-a");
        assert!(registry.is_online(1));
        assert_eq!(registry.online_count(), 1);

        assert!(registry.remove(1, "sess-a"));
        assert!(!registry.is_online(1));
        // Removing again is a no-op.
        assert!(!registry.remove(1, "sess-a"));
    }

    #[test]
    fn last_connect_wins_and_stale_disconnect_is_ignored() {
        let registry = PresenceRegistry::new();
        registry.insert(1, "sess-a");
        registry.insert(1, "sess-b");

        // The old session's disconnect must not knock the new one offline.
        assert!(!registry.remove(1, "sess-a"));
        assert!(registry.is_online(1));

        assert!(registry.remove(1, "sess-b"));
        assert!(!registry.is_online(1));
    }

    #[tokio::test]
    async fn transitions_broadcast_and_persist() {
        let pool = lobby_db::create_pool("sqlite::memory:", 1).await.unwrap();
        lobby_db::run_migrations(&pool).await.unwrap();
        users::create_user(&pool, 1, "ada", "ada@example.com", "h")
            .await
            .unwrap();

        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let registry = PresenceRegistry::new();

        mark_online(&pool, &bus, &registry, 1, "sess-a").await;
        let user = users::get_user_by_id(&pool, 1).await.unwrap().unwrap();
        assert!(user.is_online);
        let connect_seen = user.last_seen.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.event,
            OutboundEvent::UserStatusUpdate { is_online: true, .. }
        ));

        mark_offline(&pool, &bus, &registry, 1, "sess-a").await;
        let user = users::get_user_by_id(&pool, 1).await.unwrap().unwrap();
        assert!(!user.is_online);
        assert!(user.last_seen.unwrap() >= connect_seen);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.event,
            OutboundEvent::UserStatusUpdate { is_online: false, .. }
        ));
    }
}
